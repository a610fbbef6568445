//! Canonical tag text for a parsed turn.
//!
//! `parse(&turn.to_tag_text())` reproduces `turn` for any turn produced by
//! the parser. Used for transcript replay and the `parse` CLI.

use crate::core::tags::{FIN_MARKER, NO_CHANGES_MARKER, SectionTag};
use crate::core::types::{ParsedTurn, TerminalSignal};

impl ParsedTurn {
    pub fn to_tag_text(&self) -> String {
        match self.terminal {
            TerminalSignal::Fin => return FIN_MARKER.to_string(),
            TerminalSignal::NoChangesNeeded => return NO_CHANGES_MARKER.to_string(),
            _ => {}
        }

        let mut blocks: Vec<String> = Vec::new();
        let mut section = |tag: SectionTag, body: &str| {
            if !body.is_empty() {
                blocks.push(format!("{}\n{}", tag.marker(), body));
            }
        };

        section(SectionTag::Thought, self.thought.as_deref().unwrap_or_default());
        section(SectionTag::Plan, self.plan.as_deref().unwrap_or_default());
        section(
            SectionTag::CorrectionGoals,
            self.correction_goals.as_deref().unwrap_or_default(),
        );
        if !self.required_files.is_empty() {
            let json = serde_json::to_string(&self.required_files).unwrap_or_default();
            section(SectionTag::ReplyRequired, &json);
        }
        section(SectionTag::Modified, &self.patch_text);
        section(SectionTag::Comment, &self.comment_text);

        match self.terminal {
            TerminalSignal::VerificationReport => {
                blocks.push(SectionTag::VerificationReport.marker().to_string());
            }
            TerminalSignal::ReadyForFinalCheck => {
                blocks.push(SectionTag::ReadyForFinalCheck.marker().to_string());
            }
            _ => {}
        }
        blocks.join("\n")
    }
}
