//! Patch engine: apply patch text to in-memory file contents.
//!
//! The engine is tolerant by default. A removal line only deletes the buffered
//! line at the cursor when the text matches; on mismatch it is skipped and a
//! [`PatchWarning`] is recorded. Context lines only advance the cursor. A file
//! the loader cannot find starts from an empty buffer; a file the loader
//! failed to read is left out of the result entirely. Strict mode turns both
//! mismatch kinds into a [`PatchError`].

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::core::patch::{PatchError, TokenKind, tokenize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchOptions {
    /// Fail on context or removal lines that do not match the buffer.
    pub strict_context: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchedFile {
    pub path: String,
    pub content: String,
}

/// What a loader knows about one patch target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loaded {
    Content(String),
    NotFound,
    /// The file may exist but could not be read. Its edits are skipped.
    Unreadable(String),
}

impl From<Option<String>> for Loaded {
    fn from(content: Option<String>) -> Self {
        content.map_or(Loaded::NotFound, Loaded::Content)
    }
}

/// Soft, per-file diagnostics. None of these abort the patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatchWarning {
    FileNotFound {
        path: String,
    },
    RemovalMismatch {
        path: String,
        line: usize,
        expected: String,
        found: Option<String>,
    },
    /// `+++ /dev/null`: deletions are not applied.
    DeletionSkipped {
        path: String,
    },
    TargetUnreadable {
        path: String,
        reason: String,
    },
}

impl fmt::Display for PatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchWarning::FileNotFound { path } => {
                write!(f, "{path}: file not found, applied against an empty file")
            }
            PatchWarning::RemovalMismatch {
                path,
                line,
                expected,
                found,
            } => match found {
                Some(found) => write!(
                    f,
                    "{path}: removal at patch line {line} skipped, expected {expected:?} but found {found:?}"
                ),
                None => write!(
                    f,
                    "{path}: removal at patch line {line} skipped, expected {expected:?} past end of file"
                ),
            },
            PatchWarning::DeletionSkipped { path } => {
                write!(f, "{path}: file deletion is not supported, left unchanged")
            }
            PatchWarning::TargetUnreadable { path, reason } => {
                write!(f, "{path}: could not be read ({reason}), edits skipped")
            }
        }
    }
}

/// Files produced by one successful application, in first-touched order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ApplyResult {
    pub files: Vec<PatchedFile>,
    pub warnings: Vec<PatchWarning>,
}

impl ApplyResult {
    pub fn get(&self, path: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|file| file.path == path)
            .map(|file| file.content.as_str())
    }

    /// Path-annotated echo: `--- path` followed by the full new content, one
    /// block per file, separated by a blank line.
    pub fn rendered(&self) -> String {
        self.files
            .iter()
            .map(|file| format!("--- {}\n{}", file.path, file.content.trim_end_matches('\n')))
            .collect::<Vec<_>>()
            .join("\n\n")
            .trim_end()
            .to_string()
    }

    fn upsert(&mut self, path: String, content: String) {
        match self.files.iter_mut().find(|file| file.path == path) {
            Some(existing) => existing.content = content,
            None => self.files.push(PatchedFile { path, content }),
        }
    }
}

/// File content as lines plus whether the last line is newline-terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LineBuffer {
    lines: Vec<String>,
    trailing_newline: bool,
}

impl LineBuffer {
    fn from_content(content: &str) -> Self {
        if content.is_empty() {
            return Self::new_file();
        }
        let (body, trailing_newline) = match content.strip_suffix('\n') {
            Some(body) => (body, true),
            None => (content, false),
        };
        Self {
            lines: body.split('\n').map(str::to_string).collect(),
            trailing_newline,
        }
    }

    fn new_file() -> Self {
        Self {
            lines: Vec::new(),
            trailing_newline: true,
        }
    }

    fn into_content(self) -> String {
        let mut content = self.lines.join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            content.push('\n');
        }
        content
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastOp {
    Remove,
    Add,
    Context,
}

struct OpenFile {
    path: String,
    buffer: LineBuffer,
    /// The loader had the file, or it is an explicit creation.
    present: bool,
}

/// Apply `text` against contents supplied by `loader`.
///
/// `loader` answers with a [`Loaded`] (or `None` for files that do not
/// exist). Files already patched earlier in the same text are read from the
/// in-progress result, so two blocks for one path compose.
pub fn apply<F, L>(
    text: &str,
    mut loader: F,
    options: PatchOptions,
) -> Result<ApplyResult, PatchError>
where
    F: FnMut(&str) -> L,
    L: Into<Loaded>,
{
    let tokens = tokenize(text)?;
    let mut result = ApplyResult::default();
    let mut open: Option<OpenFile> = None;
    let mut old_path: Option<String> = None;
    let mut old_is_dev_null = false;
    let mut cursor = 0usize;
    let mut last_op = LastOp::Context;

    for token in tokens {
        match token.kind {
            TokenKind::OldHeader(path) => {
                flush(&mut result, open.take());
                old_is_dev_null = path.is_none();
                old_path = path;
            }
            TokenKind::NewHeader(None) => {
                flush(&mut result, open.take());
                if let Some(path) = old_path.clone() {
                    debug!(path = %path, "skipping file deletion");
                    result.warnings.push(PatchWarning::DeletionSkipped { path });
                }
            }
            TokenKind::NewHeader(Some(path)) => {
                flush(&mut result, open.take());
                let creating = std::mem::take(&mut old_is_dev_null);
                cursor = 0;
                let (buffer, present) = if let Some(content) = result.get(&path) {
                    (LineBuffer::from_content(content), true)
                } else {
                    match loader(&path).into() {
                        Loaded::Content(content) => (LineBuffer::from_content(&content), true),
                        Loaded::NotFound if creating => (LineBuffer::new_file(), true),
                        Loaded::NotFound => {
                            debug!(path = %path, "patch target not found");
                            result
                                .warnings
                                .push(PatchWarning::FileNotFound { path: path.clone() });
                            (LineBuffer::new_file(), false)
                        }
                        Loaded::Unreadable(reason) => {
                            // No buffer: hunk lines for this file are dropped and
                            // nothing is emitted for it.
                            debug!(path = %path, reason = %reason, "patch target unreadable");
                            result
                                .warnings
                                .push(PatchWarning::TargetUnreadable { path, reason });
                            continue;
                        }
                    }
                };
                open = Some(OpenFile {
                    path,
                    buffer,
                    present,
                });
            }
            TokenKind::Hunk(header) => {
                cursor = header.cursor();
                last_op = LastOp::Context;
            }
            TokenKind::Remove(expected) => {
                let Some(file) = open.as_mut() else { continue };
                last_op = LastOp::Remove;
                let lines = &mut file.buffer.lines;
                if lines.get(cursor).is_some_and(|line| line == expected) {
                    lines.remove(cursor);
                    continue;
                }
                let found = lines.get(cursor).cloned();
                if options.strict_context {
                    return Err(PatchError::RemovalMismatch {
                        line: token.line,
                        path: file.path.clone(),
                        expected: expected.to_string(),
                        found,
                    });
                }
                result.warnings.push(PatchWarning::RemovalMismatch {
                    path: file.path.clone(),
                    line: token.line,
                    expected: expected.to_string(),
                    found,
                });
            }
            TokenKind::Add(added) => {
                let Some(file) = open.as_mut() else { continue };
                last_op = LastOp::Add;
                let lines = &mut file.buffer.lines;
                let at = cursor.min(lines.len());
                lines.insert(at, added.to_string());
                cursor = at + 1;
            }
            TokenKind::Context(expected) => {
                let Some(file) = open.as_mut() else { continue };
                last_op = LastOp::Context;
                if options.strict_context {
                    let found = file.buffer.lines.get(cursor);
                    if found.is_none_or(|line| line != expected) {
                        return Err(PatchError::ContextMismatch {
                            line: token.line,
                            path: file.path.clone(),
                            expected: expected.to_string(),
                            found: found.cloned(),
                        });
                    }
                }
                cursor = cursor.saturating_add(1);
            }
            TokenKind::NoNewline => {
                // Applies to the line just before the marker: an added or kept
                // line ends the file unterminated, a removed one means the new
                // side regains the newline unless a later marker says otherwise.
                if let Some(file) = open.as_mut() {
                    file.buffer.trailing_newline = last_op == LastOp::Remove;
                }
            }
            TokenKind::Other => {}
        }
    }
    flush(&mut result, open.take());
    Ok(result)
}

fn flush(result: &mut ApplyResult, open: Option<OpenFile>) {
    let Some(file) = open else { return };
    if !file.present && file.buffer.lines.is_empty() {
        return;
    }
    result.upsert(file.path, file.buffer.into_content());
}
