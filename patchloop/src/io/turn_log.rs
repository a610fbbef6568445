//! Per-turn session logs below a configured directory.
//!
//! Layout: `<log_dir>/<session_id>/<turn>/{response.txt, parsed.json,
//! outbound.md, meta.json}` plus `<log_dir>/<session_id>/transcript.json`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::{Message, ParsedTurn};

/// What the session did with one response.
#[derive(Debug, Clone, Serialize)]
pub struct TurnMeta {
    pub session_id: String,
    pub turn: u32,
    /// Action taken, e.g. `request_files` or `done:completed`.
    pub action: String,
    pub response_bytes: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub patched_files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TurnPaths {
    pub dir: PathBuf,
    pub response_path: PathBuf,
    pub parsed_path: PathBuf,
    pub outbound_path: PathBuf,
    pub meta_path: PathBuf,
}

impl TurnPaths {
    pub fn new(log_dir: &Path, session_id: &str, turn: u32) -> Self {
        let dir = log_dir.join(session_id).join(turn.to_string());
        Self {
            dir: dir.clone(),
            response_path: dir.join("response.txt"),
            parsed_path: dir.join("parsed.json"),
            outbound_path: dir.join("outbound.md"),
            meta_path: dir.join("meta.json"),
        }
    }
}

pub struct TurnWriteRequest<'a> {
    pub log_dir: &'a Path,
    pub session_id: &'a str,
    pub meta: &'a TurnMeta,
    pub response: &'a str,
    pub parsed: &'a ParsedTurn,
    /// Absent when the turn ended the session.
    pub outbound: Option<&'a str>,
}

pub fn write_turn(request: &TurnWriteRequest<'_>) -> Result<TurnPaths> {
    let paths = TurnPaths::new(request.log_dir, request.session_id, request.meta.turn);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create turn dir {}", paths.dir.display()))?;

    write_text(&paths.response_path, request.response)?;
    write_json(&paths.parsed_path, request.parsed)?;
    if let Some(outbound) = request.outbound {
        write_text(&paths.outbound_path, outbound)?;
    }
    write_json(&paths.meta_path, request.meta)?;

    Ok(paths)
}

/// Write the full transcript; returns its path.
pub fn write_transcript(log_dir: &Path, session_id: &str, messages: &[Message]) -> Result<PathBuf> {
    let dir = log_dir.join(session_id);
    fs::create_dir_all(&dir).with_context(|| format!("create log dir {}", dir.display()))?;
    let path = dir.join("transcript.json");
    write_json(&path, &messages)?;
    Ok(path)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
