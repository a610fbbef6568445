//! Aggregation over one batch results directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::results::{TaskMeta, read_meta};

#[derive(Debug, Default, PartialEq)]
pub struct ReportSummary {
    pub tasks: usize,
    pub by_status: BTreeMap<String, usize>,
    pub avg_turns: Option<f64>,
    pub avg_duration_secs: Option<f64>,
    /// Sum of files written across tasks.
    pub files_written: usize,
}

/// Read every `<results_dir>/<task>/meta.json`.
///
/// Directories without a readable meta file are skipped and reported as
/// warnings.
pub fn aggregate(results_dir: &Path) -> Result<(ReportSummary, Vec<String>)> {
    if !results_dir.is_dir() {
        bail!("results directory {} does not exist", results_dir.display());
    }
    let mut entries: Vec<_> = fs::read_dir(results_dir)
        .with_context(|| format!("read {}", results_dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("read {}", results_dir.display()))?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut metas = Vec::new();
    let mut warnings = Vec::new();
    for entry in entries {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let meta_path = path.join("meta.json");
        match read_meta(&meta_path) {
            Ok(meta) => metas.push(meta),
            Err(err) => warnings.push(format!("skipping {}: {err:#}", path.display())),
        }
    }
    debug!(tasks = metas.len(), skipped = warnings.len(), "aggregated results");
    Ok((summarize(&metas), warnings))
}

fn summarize(metas: &[TaskMeta]) -> ReportSummary {
    let mut summary = ReportSummary {
        tasks: metas.len(),
        ..ReportSummary::default()
    };
    for meta in metas {
        *summary
            .by_status
            .entry(meta.status.as_str().to_string())
            .or_default() += 1;
        summary.files_written += meta.files_written.len();
    }
    if !metas.is_empty() {
        let count = metas.len() as f64;
        let turns: u64 = metas.iter().map(|meta| u64::from(meta.turns)).sum();
        summary.avg_turns = Some(turns as f64 / count);
        let duration: f64 = metas.iter().map(|meta| meta.duration_secs).sum();
        summary.avg_duration_secs = Some(duration / count);
    }
    summary
}
