//! Per-task result records.
//!
//! Layout: `<out>/<batch_run_id>/<task_id>/meta.json`, with the session's turn
//! logs under `<task_id>/turns/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use patchloop::core::types::DoneReason;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    NoChangesNeeded,
    NoActionableContent,
    TurnLimitExceeded,
    /// Setup or generator failure; see `TaskMeta::error`.
    Error,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Completed => "completed",
            TaskStatus::NoChangesNeeded => "no_changes_needed",
            TaskStatus::NoActionableContent => "no_actionable_content",
            TaskStatus::TurnLimitExceeded => "turn_limit_exceeded",
            TaskStatus::Error => "error",
        }
    }
}

impl From<DoneReason> for TaskStatus {
    fn from(reason: DoneReason) -> Self {
        match reason {
            DoneReason::Completed => TaskStatus::Completed,
            DoneReason::NoChangesNeeded => TaskStatus::NoChangesNeeded,
            DoneReason::NoActionableContent => TaskStatus::NoActionableContent,
            DoneReason::TurnLimitExceeded => TaskStatus::TurnLimitExceeded,
        }
    }
}

/// Metadata for one task, persisted to `meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMeta {
    pub task_id: String,
    pub batch_run_id: String,
    pub session_id: Option<String>,
    pub workdir: String,
    /// SHA-256 of the prompt file, for reproducibility tracking.
    pub prompt_hash: Option<String>,
    pub status: TaskStatus,
    pub turns: u32,
    pub files_written: Vec<String>,
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: f64,
    pub error: Option<String>,
}

impl TaskMeta {
    pub fn duration_between(started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> f64 {
        (finished_at - started_at).num_milliseconds() as f64 / 1000.0
    }
}

pub fn batch_dir(out: &Path, batch_run_id: &str) -> PathBuf {
    out.join(batch_run_id)
}

pub fn task_dir(batch_dir: &Path, task_id: &str) -> PathBuf {
    batch_dir.join(task_id)
}

pub fn write_meta(path: &Path, meta: &TaskMeta) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let contents = serde_json::to_string_pretty(meta).context("serialize meta")?;
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("write meta {}", path.display()))?;
    Ok(())
}

pub fn read_meta(path: &Path) -> Result<TaskMeta> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn dirs_are_stable() {
        let dir = task_dir(&batch_dir(Path::new("/tmp/out"), "batch-1"), "fix-a");
        assert_eq!(dir, PathBuf::from("/tmp/out/batch-1/fix-a"));
    }

    #[test]
    fn meta_round_trips_through_disk() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("fix-a").join("meta.json");
        let now = Utc::now();
        let meta = TaskMeta {
            task_id: "fix-a".to_string(),
            batch_run_id: "batch-1".to_string(),
            session_id: Some("session-1".to_string()),
            workdir: "/tmp/work".to_string(),
            prompt_hash: None,
            status: DoneReason::TurnLimitExceeded.into(),
            turns: 4,
            files_written: vec!["a.go".to_string()],
            start_time: now.to_rfc3339(),
            end_time: now.to_rfc3339(),
            duration_secs: TaskMeta::duration_between(now, now),
            error: None,
        };
        write_meta(&path, &meta).expect("write");
        let loaded = read_meta(&path).expect("read");
        assert_eq!(loaded.status, TaskStatus::TurnLimitExceeded);
        assert_eq!(loaded.files_written, vec!["a.go"]);
        let raw = fs::read_to_string(&path).expect("raw");
        assert!(raw.contains("\"status\": \"turn_limit_exceeded\""));
    }

    #[test]
    fn hashes_prompt_contents() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("prompt.md");
        fs::write(&path, "abc").expect("write");
        assert_eq!(
            file_sha256(&path).expect("hash"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
