//! Shared deterministic types for the repair loop.
//!
//! These types define the contracts between the response parser, the patch
//! engine and the session loop. They carry no I/O and serialize to stable JSON
//! for per-turn logs.

use serde::{Deserialize, Serialize};

/// What a file request asks the orchestrator to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    FileContent,
    DirectoryListing,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::FileContent => "FILE_CONTENT",
            RequestKind::DirectoryListing => "DIRECTORY_LISTING",
        }
    }

    /// Parse a wire-level request type. Unknown values are `None`.
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.trim() {
            "FILE_CONTENT" => Some(RequestKind::FileContent),
            "DIRECTORY_LISTING" => Some(RequestKind::DirectoryListing),
            _ => None,
        }
    }
}

/// One file or directory the generator wants to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequest {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub path: String,
}

impl FileRequest {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::FileContent,
            path: path.into(),
        }
    }

    pub fn listing(path: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::DirectoryListing,
            path: path.into(),
        }
    }
}

/// Completion-style markers a response may carry. At most one per turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalSignal {
    #[default]
    None,
    Fin,
    NoChangesNeeded,
    VerificationReport,
    ReadyForFinalCheck,
}

/// Structured view of one generator response.
///
/// `required_files` is ordered and unique by path (first occurrence wins).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParsedTurn {
    pub thought: Option<String>,
    pub plan: Option<String>,
    pub correction_goals: Option<String>,
    pub required_files: Vec<FileRequest>,
    pub patch_text: String,
    pub comment_text: String,
    pub terminal: TerminalSignal,
}

impl ParsedTurn {
    pub fn with_terminal(terminal: TerminalSignal) -> Self {
        Self {
            terminal,
            ..Self::default()
        }
    }

    /// True when the turn carries nothing the session loop can act on.
    pub fn is_unproductive(&self) -> bool {
        self.terminal == TerminalSignal::None
            && self.required_files.is_empty()
            && self.patch_text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One transcript entry sent to the text generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneReason {
    /// The generator signalled completion.
    Completed,
    /// The generator confirmed, after a verification prompt, that nothing needs fixing.
    NoChangesNeeded,
    /// A response carried no file requests, no patch and no signal.
    NoActionableContent,
    /// The turn bound was reached before any terminal classification.
    TurnLimitExceeded,
}

impl DoneReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DoneReason::Completed => "completed",
            DoneReason::NoChangesNeeded => "no_changes_needed",
            DoneReason::NoActionableContent => "no_actionable_content",
            DoneReason::TurnLimitExceeded => "turn_limit_exceeded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_request_serializes_with_wire_names() {
        let req = FileRequest::listing("src");
        let json = serde_json::to_string(&req).expect("serialize");
        assert_eq!(json, r#"{"type":"DIRECTORY_LISTING","path":"src"}"#);
    }

    #[test]
    fn empty_turn_is_unproductive() {
        assert!(ParsedTurn::default().is_unproductive());
        assert!(!ParsedTurn::with_terminal(TerminalSignal::Fin).is_unproductive());
    }

    #[test]
    fn whitespace_patch_is_unproductive() {
        let turn = ParsedTurn {
            patch_text: "  \n".to_string(),
            ..ParsedTurn::default()
        };
        assert!(turn.is_unproductive());
    }
}
