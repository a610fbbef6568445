//! Patch text tokenizer and structural model.
//!
//! Both [`Patch::parse`] and the apply engine consume the same token stream,
//! so a header is recognized identically in diagnostics and in application.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Path used by diff tools for "no file on this side".
pub const DEV_NULL: &str = "/dev/null";

static HUNK_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@\s*-(\S+)\s+\+(\S+)\s*@@").expect("hunk header regex should be valid")
});

/// Structured failure of a single patch attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("unparseable hunk header at patch line {line}: {text}")]
    UnparseableHeader { line: usize, text: String },

    #[error(
        "context mismatch in {path} at patch line {line}: expected {expected:?}, found {}",
        describe_found(.found)
    )]
    ContextMismatch {
        line: usize,
        path: String,
        expected: String,
        found: Option<String>,
    },

    #[error(
        "removal mismatch in {path} at patch line {line}: expected {expected:?}, found {}",
        describe_found(.found)
    )]
    RemovalMismatch {
        line: usize,
        path: String,
        expected: String,
        found: Option<String>,
    },
}

fn describe_found(found: &Option<String>) -> String {
    match found {
        Some(text) => format!("{text:?}"),
        None => "end of file".to_string(),
    }
}

impl PatchError {
    /// Stable kind name used in feedback messages and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PatchError::UnparseableHeader { .. } => "UNPARSEABLE_HEADER",
            PatchError::ContextMismatch { .. } => "CONTEXT_MISMATCH",
            PatchError::RemovalMismatch { .. } => "REMOVAL_MISMATCH",
        }
    }

    /// 1-based line in the patch text that triggered the failure.
    pub fn line(&self) -> usize {
        match self {
            PatchError::UnparseableHeader { line, .. }
            | PatchError::ContextMismatch { line, .. }
            | PatchError::RemovalMismatch { line, .. } => *line,
        }
    }
}

/// Numbers from an `@@ -a,b +c,d @@` line. Omitted lengths default to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HunkHeader {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
}

impl HunkHeader {
    /// 0-based buffer position where the hunk's first line applies.
    ///
    /// An empty new range names the line *before* the change, so its start is
    /// already the 0-based insertion point.
    pub fn cursor(&self) -> usize {
        if self.new_len == 0 {
            self.new_start
        } else {
            self.new_start.saturating_sub(1)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind<'a> {
    /// `--- path`; `None` for `/dev/null`.
    OldHeader(Option<String>),
    /// `+++ path`; `None` for `/dev/null`.
    NewHeader(Option<String>),
    Hunk(HunkHeader),
    Remove(&'a str),
    Add(&'a str),
    Context(&'a str),
    /// `\ No newline at end of file`
    NoNewline,
    /// Anything outside a hunk, or an unrecognized line inside one.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// 1-based line number in the patch text.
    pub line: usize,
    pub kind: TokenKind<'a>,
}

/// Split patch text into classified lines.
///
/// A `--- ` line inside a hunk is a file header only when the next line starts
/// with `+++ `; otherwise it is the removal of a line beginning with `--`.
pub fn tokenize(text: &str) -> Result<Vec<Token<'_>>, PatchError> {
    let body = text.strip_suffix('\n').unwrap_or(text);
    let lines: Vec<&str> = body
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();
    let mut tokens = Vec::with_capacity(lines.len());
    let mut in_hunk = false;
    let mut after_old_header = false;

    for (idx, line) in lines.iter().enumerate() {
        let number = idx + 1;
        let next_is_new_header = lines
            .get(idx + 1)
            .is_some_and(|next| next.starts_with("+++ "));

        let kind = if let Some(rest) = line.strip_prefix("--- ")
            && (!in_hunk || next_is_new_header)
        {
            in_hunk = false;
            TokenKind::OldHeader(header_path(rest))
        } else if let Some(rest) = line.strip_prefix("+++ ")
            && (after_old_header || !in_hunk)
        {
            in_hunk = false;
            TokenKind::NewHeader(header_path(rest))
        } else if line.starts_with("@@") {
            in_hunk = true;
            TokenKind::Hunk(parse_hunk_header(line, number)?)
        } else if in_hunk {
            classify_hunk_line(line)
        } else {
            TokenKind::Other
        };

        after_old_header = matches!(kind, TokenKind::OldHeader(_));
        tokens.push(Token { line: number, kind });
    }
    Ok(tokens)
}

fn classify_hunk_line(line: &str) -> TokenKind<'_> {
    if let Some(rest) = line.strip_prefix('-') {
        TokenKind::Remove(rest)
    } else if let Some(rest) = line.strip_prefix('+') {
        TokenKind::Add(rest)
    } else if let Some(rest) = line.strip_prefix(' ') {
        TokenKind::Context(rest)
    } else if line.is_empty() {
        // Blank context line whose leading space was stripped in transit.
        TokenKind::Context("")
    } else if line.starts_with('\\') {
        TokenKind::NoNewline
    } else {
        TokenKind::Other
    }
}

/// Normalize a header path: drop timestamps and `a/`, `b/`, `./` prefixes.
pub fn header_path(raw: &str) -> Option<String> {
    let path = raw.split('\t').next().unwrap_or(raw).trim();
    if path == DEV_NULL {
        return None;
    }
    let path = path
        .strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path);
    let path = path.strip_prefix("./").unwrap_or(path);
    Some(path.to_string())
}

fn parse_hunk_header(line: &str, number: usize) -> Result<HunkHeader, PatchError> {
    let unparseable = || PatchError::UnparseableHeader {
        line: number,
        text: line.to_string(),
    };
    let caps = HUNK_HEADER_RE.captures(line).ok_or_else(unparseable)?;
    let (old_start, old_len) = parse_range(&caps[1]).ok_or_else(unparseable)?;
    let (new_start, new_len) = parse_range(&caps[2]).ok_or_else(unparseable)?;
    Ok(HunkHeader {
        old_start,
        old_len,
        new_start,
        new_len,
    })
}

fn parse_range(raw: &str) -> Option<(usize, usize)> {
    match raw.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((raw.parse().ok()?, 1)),
    }
}

/// One hunk: where it lands and which lines it removes and adds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hunk {
    /// 1-based line in the target file.
    pub start_line: usize,
    pub removed_lines: Vec<String>,
    pub added_lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEdit {
    pub relative_path: String,
    /// Old side was `/dev/null`.
    pub creates: bool,
    /// New side was `/dev/null`.
    pub deletes: bool,
    pub hunks: Vec<Hunk>,
}

/// Structural view of a patch block, built fresh for each attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Patch {
    pub file_edits: Vec<FileEdit>,
}

impl Patch {
    pub fn parse(text: &str) -> Result<Self, PatchError> {
        let mut file_edits: Vec<FileEdit> = Vec::new();
        let mut old_path: Option<String> = None;

        for token in tokenize(text)? {
            match token.kind {
                TokenKind::OldHeader(path) => old_path = path,
                TokenKind::NewHeader(path) => {
                    let creates = old_path.is_none();
                    let deletes = path.is_none();
                    let relative_path = path.or_else(|| old_path.clone()).unwrap_or_default();
                    file_edits.push(FileEdit {
                        relative_path,
                        creates,
                        deletes,
                        hunks: Vec::new(),
                    });
                }
                TokenKind::Hunk(header) => {
                    if let Some(edit) = file_edits.last_mut() {
                        edit.hunks.push(Hunk {
                            start_line: header.new_start,
                            removed_lines: Vec::new(),
                            added_lines: Vec::new(),
                        });
                    }
                }
                TokenKind::Remove(text) => {
                    if let Some(hunk) = last_hunk(&mut file_edits) {
                        hunk.removed_lines.push(text.to_string());
                    }
                }
                TokenKind::Add(text) => {
                    if let Some(hunk) = last_hunk(&mut file_edits) {
                        hunk.added_lines.push(text.to_string());
                    }
                }
                TokenKind::Context(_) | TokenKind::NoNewline | TokenKind::Other => {}
            }
        }
        Ok(Self { file_edits })
    }

    pub fn target_paths(&self) -> Vec<&str> {
        self.file_edits
            .iter()
            .map(|edit| edit.relative_path.as_str())
            .collect()
    }

    /// Total `(added, removed)` line counts across all hunks.
    pub fn line_counts(&self) -> (usize, usize) {
        self.file_edits
            .iter()
            .flat_map(|edit| &edit.hunks)
            .fold((0, 0), |(added, removed), hunk| {
                (
                    added + hunk.added_lines.len(),
                    removed + hunk.removed_lines.len(),
                )
            })
    }
}

fn last_hunk(edits: &mut [FileEdit]) -> Option<&mut Hunk> {
    edits.last_mut().and_then(|edit| edit.hunks.last_mut())
}
