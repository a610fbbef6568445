//! Scripted collaborators for session tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use anyhow::{Result, anyhow};

use crate::core::types::Message;
use crate::io::file_store::FileStore;
use crate::io::generator::TextGenerator;

/// One scripted generator reaction.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Error(String),
}

/// Replays canned responses in order and records every transcript it was sent.
///
/// Running out of responses is an error, which keeps runaway loops visible.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<ScriptedReply>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedGenerator {
    pub fn new<I, T>(responses: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::from_replies(
            responses
                .into_iter()
                .map(|text| ScriptedReply::Text(text.into())),
        )
    }

    pub fn from_replies(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Transcripts received so far, one per call.
    pub fn transcripts(&self) -> Vec<Vec<Message>> {
        self.seen.lock().expect("transcripts lock").clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().expect("transcripts lock").len()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn send(&self, transcript: &[Message]) -> Result<String> {
        self.seen
            .lock()
            .expect("transcripts lock")
            .push(transcript.to_vec());
        match self.replies.lock().expect("replies lock").pop_front() {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Error(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted generator has no responses left")),
        }
    }
}

/// In-memory [`FileStore`] with read counters and injectable write failures.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: Mutex<BTreeMap<String, String>>,
    reads: Mutex<BTreeMap<String, usize>>,
    read_only: Mutex<Vec<String>>,
}

impl MemoryFileStore {
    pub fn with_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let store = Self::default();
        {
            let mut map = store.files.lock().expect("files lock");
            for (path, content) in files {
                map.insert(path.to_string(), content.to_string());
            }
        }
        store
    }

    /// Make writes to `path` fail.
    pub fn deny_writes(&self, path: &str) {
        self.read_only
            .lock()
            .expect("read-only lock")
            .push(path.to_string());
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.files.lock().expect("files lock").get(path).cloned()
    }

    /// How often `read` was called for `path`.
    pub fn reads(&self, path: &str) -> usize {
        self.reads
            .lock()
            .expect("reads lock")
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

impl FileStore for MemoryFileStore {
    fn read(&self, path: &str) -> Result<Option<String>> {
        *self
            .reads
            .lock()
            .expect("reads lock")
            .entry(path.to_string())
            .or_default() += 1;
        Ok(self.get(path))
    }

    fn write(&self, path: &str, content: &str) -> Result<()> {
        if self
            .read_only
            .lock()
            .expect("read-only lock")
            .iter()
            .any(|denied| denied == path)
        {
            return Err(anyhow!("permission denied: {path}"));
        }
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    fn list(&self, path: &str, depth: usize) -> Result<Option<Vec<String>>> {
        let prefix = match path.trim_matches('/') {
            "" | "." => String::new(),
            dir => format!("{dir}/"),
        };
        let files = self.files.lock().expect("files lock");
        let mut entries: Vec<String> = Vec::new();
        for file in files.keys().filter(|file| file.starts_with(&prefix)) {
            let rest = &file[prefix.len()..];
            let parts: Vec<&str> = rest.split('/').collect();
            for level in 1..=parts.len().min(depth) {
                let mut entry = format!("{prefix}{}", parts[..level].join("/"));
                if level < parts.len() {
                    entry.push('/');
                }
                if !entries.contains(&entry) {
                    entries.push(entry);
                }
            }
        }
        if entries.is_empty() && !prefix.is_empty() {
            return Ok(None);
        }
        entries.sort();
        Ok(Some(entries))
    }

    fn suggest_similar(&self, path: &str) -> Vec<String> {
        let files = self.files.lock().expect("files lock");
        crate::core::similarity::rank(path, files.keys().map(String::as_str))
    }
}
