//! Outbound message rendering.
//!
//! Every message the session sends is rendered from a template embedded at
//! compile time, so the protocol text lives next to the code that relies on it.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::patch::PatchError;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const FILE_REPLY_TEMPLATE: &str = include_str!("prompts/file_reply.md");
const PATCH_RESULT_TEMPLATE: &str = include_str!("prompts/patch_result.md");
const PATCH_ERROR_TEMPLATE: &str = include_str!("prompts/patch_error.md");
const VERIFY_NO_CHANGES_TEMPLATE: &str = include_str!("prompts/verify_no_changes.md");
const FINAL_CHECK_TEMPLATE: &str = include_str!("prompts/final_check.md");
const CORRECTIVE_TEMPLATE: &str = include_str!("prompts/corrective.md");

/// One `--- path` block in a file reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyEntry {
    pub path: String,
    pub body: String,
}

/// Advisory text carried from the turn that triggered a reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnNotes<'a> {
    pub thought: Option<&'a str>,
    pub plan: Option<&'a str>,
    pub comment: Option<&'a str>,
    pub goals: Option<&'a str>,
}

/// Inputs for the message sent after a successful patch.
#[derive(Debug, Clone, Default)]
pub struct PatchReport<'a> {
    pub rendered: &'a str,
    pub diff: &'a str,
    pub added: usize,
    pub removed: usize,
    pub warnings: Vec<String>,
    pub write_failures: Vec<String>,
    pub goals: Option<&'a str>,
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|s| !s.is_empty())
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        for (name, source) in [
            ("system", SYSTEM_TEMPLATE),
            ("file_reply", FILE_REPLY_TEMPLATE),
            ("patch_result", PATCH_RESULT_TEMPLATE),
            ("patch_error", PATCH_ERROR_TEMPLATE),
            ("verify_no_changes", VERIFY_NO_CHANGES_TEMPLATE),
            ("final_check", FINAL_CHECK_TEMPLATE),
            ("corrective", CORRECTIVE_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("prompt template should be valid");
        }
        Self { env }
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let rendered = self.env.get_template(name)?.render(ctx)?;
        Ok(rendered.trim_end().to_string())
    }

    /// Built-in description of the tag protocol.
    pub fn system(&self) -> Result<String> {
        self.render("system", context! {})
    }

    pub fn file_reply(
        &self,
        files: &[ReplyEntry],
        listings: &[ReplyEntry],
        notes: TurnNotes<'_>,
    ) -> Result<String> {
        self.render(
            "file_reply",
            context! {
                files => files,
                listings => listings,
                thought => non_empty(notes.thought),
                plan => non_empty(notes.plan),
                comment => non_empty(notes.comment),
                goals => non_empty(notes.goals),
            },
        )
    }

    pub fn patch_result(&self, report: &PatchReport<'_>) -> Result<String> {
        self.render(
            "patch_result",
            context! {
                rendered => report.rendered,
                diff => report.diff.trim_end(),
                added => report.added,
                removed => report.removed,
                warnings => &report.warnings,
                write_failures => &report.write_failures,
                goals => non_empty(report.goals),
            },
        )
    }

    pub fn patch_error(
        &self,
        err: &PatchError,
        patch_text: &str,
        goals: Option<&str>,
    ) -> Result<String> {
        self.render(
            "patch_error",
            context! {
                kind => err.kind(),
                line => err.line(),
                message => err.to_string(),
                patch => patch_text.trim_end(),
                goals => non_empty(goals),
            },
        )
    }

    pub fn verify_no_changes(&self, comment: Option<&str>, goals: Option<&str>) -> Result<String> {
        self.render(
            "verify_no_changes",
            context! {
                comment => non_empty(comment),
                goals => non_empty(goals),
            },
        )
    }

    pub fn final_check(&self, files_written: &[String], goals: Option<&str>) -> Result<String> {
        self.render(
            "final_check",
            context! {
                files_written => files_written,
                goals => non_empty(goals),
            },
        )
    }

    pub fn corrective(&self, goals: Option<&str>) -> Result<String> {
        self.render(
            "corrective",
            context! {
                goals => non_empty(goals),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, body: &str) -> ReplyEntry {
        ReplyEntry {
            path: path.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn system_prompt_names_every_marker() {
        let system = PromptEngine::new().system().expect("render");
        for marker in [
            "%_Thought_%",
            "%_Plan_%",
            "%_Correction_Goals_%",
            "%_Reply Required_%",
            "%_Modified_%",
            "%_Comment_%",
            "%%_Fin_%%",
            "%_No_Changes_Needed_%",
            "%_Ready_For_Final_Check_%",
            "%_Verification_Report_%",
        ] {
            assert!(system.contains(marker), "missing {marker}");
        }
    }

    #[test]
    fn file_reply_groups_files_then_listings() {
        let text = PromptEngine::new()
            .file_reply(
                &[entry("a.go", "package a")],
                &[entry("src", "src/main.go")],
                TurnNotes {
                    plan: Some("look at a.go"),
                    goals: Some("fix the build"),
                    ..TurnNotes::default()
                },
            )
            .expect("render");
        let files = text.find("=== FILE CONTENTS ===").expect("files");
        let listings = text.find("=== DIRECTORY STRUCTURES ===").expect("listings");
        assert!(files < listings);
        assert!(text.contains("--- a.go\npackage a\n"));
        assert!(text.contains("look at a.go"));
        assert!(text.contains("fix the build"));
        assert!(!text.contains("<previous_thought>"));
    }

    #[test]
    fn file_reply_omits_empty_sections() {
        let text = PromptEngine::new()
            .file_reply(&[entry("a.go", "x")], &[], TurnNotes::default())
            .expect("render");
        assert!(!text.contains("DIRECTORY STRUCTURES"));
        assert!(!text.contains("correction_goals"));
    }

    #[test]
    fn patch_error_carries_kind_line_and_patch() {
        let err = PatchError::UnparseableHeader {
            line: 3,
            text: "@@ -1 +x @@".to_string(),
        };
        let text = PromptEngine::new()
            .patch_error(&err, "--- a\n+++ a\n@@ -1 +x @@\n", None)
            .expect("render");
        assert!(text.contains("kind: UNPARSEABLE_HEADER"));
        assert!(text.contains("line: 3"));
        assert!(text.contains("@@ -1 +x @@"));
    }

    #[test]
    fn patch_result_lists_warnings_and_failures() {
        let text = PromptEngine::new()
            .patch_result(&PatchReport {
                rendered: "--- a.txt\nnew",
                diff: "-old\n+new\n",
                added: 1,
                removed: 1,
                warnings: vec!["b.txt: file not found".to_string()],
                write_failures: vec!["c.txt: permission denied".to_string()],
                goals: None,
            })
            .expect("render");
        assert!(text.contains("Result of your patch"));
        assert!(text.contains("- b.txt: file not found"));
        assert!(text.contains("- c.txt: permission denied"));
    }

    #[test]
    fn final_check_lists_written_files() {
        let engine = PromptEngine::new();
        let text = engine
            .final_check(&["a.go".to_string(), "b.go".to_string()], None)
            .expect("render");
        assert!(text.contains("- a.go\n- b.go"));
        let empty = engine.final_check(&[], None).expect("render");
        assert!(empty.contains("No files have been written"));
    }
}
