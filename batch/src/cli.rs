//! CLI command implementations.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::manifest::Manifest;
use crate::report::aggregate;
use crate::run::run_batch;

/// Run all tasks of a manifest and print one line per task.
pub fn run_manifest(manifest_path: &Path, jobs: usize, out: &Path) -> Result<()> {
    if jobs == 0 {
        bail!("--jobs must be > 0");
    }
    let manifest = Manifest::load(manifest_path).context("load manifest")?;
    info!(tasks = manifest.tasks.len(), jobs, "starting batch");
    let batch = run_batch(manifest_path, &manifest, jobs, out)?;
    for task in &batch.tasks {
        println!(
            "run: task={} status={} turns={} files_written={}",
            task.task_id,
            task.status.as_str(),
            task.turns,
            task.files_written.len()
        );
    }
    println!(
        "run: batch_run_id={} results={}",
        batch.batch_run_id,
        batch.results_dir.display()
    );
    Ok(())
}

/// Show aggregated results for one batch run directory.
pub fn report_results(results_dir: &Path) -> Result<()> {
    let (summary, warnings) = aggregate(results_dir)?;
    println!("report: tasks={}", summary.tasks);
    for (status, count) in &summary.by_status {
        println!("report: {status}={count}");
    }
    if let Some(avg) = summary.avg_turns {
        println!("report: avg_turns={avg:.2}");
    }
    if let Some(avg) = summary.avg_duration_secs {
        println!("report: avg_duration_secs={avg:.2}");
    }
    println!("report: files_written={}", summary.files_written);
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}
