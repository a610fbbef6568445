//! Batch execution.
//!
//! Tasks are pulled from a shared index by `jobs` worker threads. Each task
//! runs one patchloop session in its own working directory; a failing task is
//! recorded with status `error` and never stops the batch.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};
use tracing::{debug, info, instrument, warn};

use patchloop::io::config::{SessionConfig, load_config};
use patchloop::io::file_store::DirFileStore;
use patchloop::io::generator::CommandGenerator;
use patchloop::session::{Outcome, Session};

use crate::manifest::{Manifest, TaskDefaults, TaskSpec};
use crate::results::{TaskMeta, TaskStatus, batch_dir, file_sha256, task_dir, write_meta};

/// Result of one batch invocation.
#[derive(Debug)]
pub struct BatchRun {
    pub batch_run_id: String,
    pub results_dir: PathBuf,
    /// One record per task, in manifest order.
    pub tasks: Vec<TaskMeta>,
}

pub fn generate_batch_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let mut rng = rand::thread_rng();
    let suffix = std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase();
    format!("batch-{timestamp}-{suffix}")
}

/// Run every task of `manifest` with at most `jobs` sessions in flight.
#[instrument(skip_all, fields(manifest = %manifest_path.display(), jobs))]
pub fn run_batch(manifest_path: &Path, manifest: &Manifest, jobs: usize, out: &Path) -> Result<BatchRun> {
    let batch_run_id = generate_batch_run_id();
    let results_dir = batch_dir(out, &batch_run_id);
    std::fs::create_dir_all(&results_dir)
        .with_context(|| format!("create results dir {}", results_dir.display()))?;
    info!(batch_run_id = %batch_run_id, tasks = manifest.tasks.len(), "batch started");

    let next = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<Result<TaskMeta>>>> =
        Mutex::new((0..manifest.tasks.len()).map(|_| None).collect());
    let workers = jobs.clamp(1, manifest.tasks.len().max(1));

    thread::scope(|scope| {
        for worker in 0..workers {
            let next = &next;
            let slots = &slots;
            let batch_run_id = batch_run_id.as_str();
            let results_dir = results_dir.as_path();
            scope.spawn(move || {
                loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(task) = manifest.tasks.get(index) else {
                        break;
                    };
                    debug!(worker, task_id = %task.id, "task picked up");
                    let recorded =
                        run_task(task, &manifest.defaults, batch_run_id, results_dir);
                    if let Ok(mut slots) = slots.lock() {
                        slots[index] = Some(recorded);
                    }
                }
            });
        }
    });

    let slots = slots
        .into_inner()
        .map_err(|_| anyhow!("task results lock poisoned"))?;
    let mut tasks = Vec::with_capacity(slots.len());
    for (index, slot) in slots.into_iter().enumerate() {
        let recorded = slot.ok_or_else(|| anyhow!("task {index} produced no result"))?;
        tasks.push(recorded?);
    }
    info!(batch_run_id = %batch_run_id, "batch finished");
    Ok(BatchRun {
        batch_run_id,
        results_dir,
        tasks,
    })
}

/// Run one task and persist its `meta.json`. Only persistence errors are
/// returned; session failures become an `error` record.
#[instrument(skip_all, fields(task_id = %task.id))]
fn run_task(
    task: &TaskSpec,
    defaults: &TaskDefaults,
    batch_run_id: &str,
    results_dir: &Path,
) -> Result<TaskMeta> {
    let dir = task_dir(results_dir, &task.id);
    let started_at = Utc::now();
    let prompt_hash = match file_sha256(&task.prompt) {
        Ok(hash) => Some(hash),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "prompt hash failed");
            None
        }
    };

    let session = run_session(task, defaults, &dir);
    let finished_at = Utc::now();
    let meta = build_meta(task, batch_run_id, prompt_hash, session, started_at, finished_at);
    info!(status = meta.status.as_str(), turns = meta.turns, "task finished");
    write_meta(&dir.join("meta.json"), &meta)?;
    Ok(meta)
}

fn run_session(task: &TaskSpec, defaults: &TaskDefaults, dir: &Path) -> Result<Outcome> {
    if !task.workdir.is_dir() {
        return Err(anyhow!(
            "working directory {} does not exist",
            task.workdir.display()
        ));
    }
    let mut config: SessionConfig = load_config(&task.config_path(defaults))?;
    if let Some(max_turns) = task.max_turns(defaults) {
        config.max_turns = max_turns;
    }
    config.log_dir = Some(dir.join("turns"));
    config.validate()?;

    let prompt = std::fs::read_to_string(&task.prompt)
        .with_context(|| format!("read {}", task.prompt.display()))?;
    let generator = CommandGenerator::from_config(&config.generator)?.with_workdir(&task.workdir);
    let store = DirFileStore::new(&task.workdir, config.max_file_bytes);
    Session::new(generator, store, config)
        .with_session_id(task.id.clone())
        .run(&prompt)
}

fn build_meta(
    task: &TaskSpec,
    batch_run_id: &str,
    prompt_hash: Option<String>,
    session: Result<Outcome>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
) -> TaskMeta {
    let mut meta = TaskMeta {
        task_id: task.id.clone(),
        batch_run_id: batch_run_id.to_string(),
        session_id: None,
        workdir: task.workdir.display().to_string(),
        prompt_hash,
        status: TaskStatus::Error,
        turns: 0,
        files_written: Vec::new(),
        start_time: started_at.to_rfc3339(),
        end_time: finished_at.to_rfc3339(),
        duration_secs: TaskMeta::duration_between(started_at, finished_at),
        error: None,
    };
    match session {
        Ok(outcome) => {
            meta.session_id = Some(outcome.session_id);
            meta.status = outcome.reason.into();
            meta.turns = outcome.turns;
            meta.files_written = outcome.files_written;
        }
        Err(err) => {
            warn!(err = %format!("{err:#}"), "task failed");
            meta.error = Some(format!("{err:#}"));
        }
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn batch_run_id_format() {
        let id = generate_batch_run_id();
        assert!(id.starts_with("batch-"));
        let suffix = id.rsplit('-').next().expect("suffix");
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|ch| !ch.is_ascii_uppercase()));
    }

    #[test]
    fn missing_workdir_is_recorded_as_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let prompt = temp.path().join("prompt.md");
        fs::write(&prompt, "fix it").expect("prompt");
        let manifest = Manifest {
            defaults: TaskDefaults::default(),
            tasks: vec![TaskSpec {
                id: "gone".to_string(),
                workdir: temp.path().join("missing"),
                prompt,
                config: None,
                max_turns: None,
            }],
        };
        let out = temp.path().join("out");
        let batch = run_batch(&temp.path().join("m.toml"), &manifest, 2, &out).expect("batch");
        assert_eq!(batch.tasks.len(), 1);
        assert_eq!(batch.tasks[0].status, TaskStatus::Error);
        assert!(
            batch.tasks[0]
                .error
                .as_deref()
                .is_some_and(|err| err.contains("does not exist"))
        );
        assert!(batch.results_dir.join("gone/meta.json").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn runs_tasks_concurrently_with_command_generator() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("generator.sh");
        fs::write(&script, "cat >/dev/null\necho '%%_Fin_%%'\n").expect("script");
        let config = temp.path().join("patchloop.toml");
        fs::write(
            &config,
            format!(
                "[generator]\ncommand = [\"sh\", \"{}\"]\ntimeout_secs = 30\n",
                script.display()
            ),
        )
        .expect("config");
        let prompt = temp.path().join("prompt.md");
        fs::write(&prompt, "fix it").expect("prompt");

        let tasks = ["a", "b", "c"]
            .iter()
            .map(|id| {
                let workdir = temp.path().join(id);
                fs::create_dir_all(&workdir).expect("workdir");
                TaskSpec {
                    id: (*id).to_string(),
                    workdir,
                    prompt: prompt.clone(),
                    config: None,
                    max_turns: Some(2),
                }
            })
            .collect();
        let manifest = Manifest {
            defaults: TaskDefaults {
                config: Some(config),
                max_turns: None,
            },
            tasks,
        };

        let out = temp.path().join("out");
        let batch = run_batch(&temp.path().join("m.toml"), &manifest, 2, &out).expect("batch");
        let ids: Vec<&str> = batch.tasks.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        for task in &batch.tasks {
            assert_eq!(task.status, TaskStatus::Completed, "{task:?}");
            assert_eq!(task.turns, 1);
            assert!(task.prompt_hash.is_some());
            assert!(
                batch
                    .results_dir
                    .join(&task.task_id)
                    .join("turns")
                    .join(&task.task_id)
                    .join("transcript.json")
                    .is_file()
            );
        }
    }
}
