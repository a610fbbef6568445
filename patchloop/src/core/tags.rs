//! Section tags of the `%_Name_%` response protocol.
//!
//! Every delimiter resolves to exactly one [`SectionTag`]. Canonical spellings
//! are matched case-sensitively first, then a normalized alias table is
//! consulted, and anything else lands in the explicit default arm
//! ([`SectionTag::ReplyRequired`]) so unknown sections are read as more file
//! requests instead of being dropped.

use std::sync::LazyLock;

use regex::Regex;

/// Whole-text completion marker, checked before any section scanning.
pub const FIN_MARKER: &str = "%%_Fin_%%";
/// Whole-text "nothing to fix" marker, checked right after [`FIN_MARKER`].
pub const NO_CHANGES_MARKER: &str = "%_No_Changes_Needed_%";

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%_([A-Za-z][A-Za-z0-9 _\-]*?)_%").expect("tag regex should be valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionTag {
    Thought,
    Plan,
    CorrectionGoals,
    ReplyRequired,
    Modified,
    Comment,
    /// Advisory verification notes. Content is discarded.
    Ignored,
    /// Line-scan terminal: stops scanning, keeps advisory fields only.
    VerificationReport,
    /// Line-scan terminal: stops scanning, keeps advisory fields only.
    ReadyForFinalCheck,
}

const CANONICAL: &[(&str, SectionTag)] = &[
    ("Thought", SectionTag::Thought),
    ("Plan", SectionTag::Plan),
    ("Correction_Goals", SectionTag::CorrectionGoals),
    ("Reply Required", SectionTag::ReplyRequired),
    ("Modified", SectionTag::Modified),
    ("Comment", SectionTag::Comment),
    ("Verification_Report", SectionTag::VerificationReport),
    ("Ready_For_Final_Check", SectionTag::ReadyForFinalCheck),
];

/// Lowercase, underscore-separated aliases for generators that drift from
/// the canonical spelling.
const ALIASES: &[(&str, SectionTag)] = &[
    ("thought", SectionTag::Thought),
    ("thoughts", SectionTag::Thought),
    ("plan", SectionTag::Plan),
    ("correction_goals", SectionTag::CorrectionGoals),
    ("correction_goal", SectionTag::CorrectionGoals),
    ("reply_required", SectionTag::ReplyRequired),
    ("modified", SectionTag::Modified),
    ("comment", SectionTag::Comment),
    ("comments", SectionTag::Comment),
    ("verification", SectionTag::Ignored),
    ("verification_report", SectionTag::Ignored),
    ("ready_for_final_check", SectionTag::ReadyForFinalCheck),
];

impl SectionTag {
    /// Resolve a tag name (the text between `%_` and `_%`).
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if let Some((_, tag)) = CANONICAL.iter().find(|(canon, _)| *canon == name) {
            return *tag;
        }
        let normalized = normalize_name(name);
        match ALIASES.iter().find(|(alias, _)| *alias == normalized) {
            Some((_, tag)) => *tag,
            None => SectionTag::ReplyRequired,
        }
    }

    /// Canonical delimiter text, as written by [`crate::core::render`].
    pub fn marker(self) -> &'static str {
        match self {
            SectionTag::Thought => "%_Thought_%",
            SectionTag::Plan => "%_Plan_%",
            SectionTag::CorrectionGoals => "%_Correction_Goals_%",
            SectionTag::ReplyRequired => "%_Reply Required_%",
            SectionTag::Modified => "%_Modified_%",
            SectionTag::Comment => "%_Comment_%",
            SectionTag::Ignored => "%_Verification_%",
            SectionTag::VerificationReport => "%_Verification_Report_%",
            SectionTag::ReadyForFinalCheck => "%_Ready_For_Final_Check_%",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SectionTag::VerificationReport | SectionTag::ReadyForFinalCheck
        )
    }
}

/// A delimiter found on a line plus any text trailing it on the same line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagLine<'a> {
    pub tag: SectionTag,
    pub rest: &'a str,
}

/// Detect a section delimiter anywhere in `line` (e.g. `## %_Plan_%`).
pub fn match_tag_line(line: &str) -> Option<TagLine<'_>> {
    let caps = TAG_RE.captures(line)?;
    let whole = caps.get(0)?;
    let name = caps.get(1)?.as_str();
    Some(TagLine {
        tag: SectionTag::from_name(name),
        rest: line[whole.end()..].trim(),
    })
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_resolve() {
        assert_eq!(SectionTag::from_name("Reply Required"), SectionTag::ReplyRequired);
        assert_eq!(SectionTag::from_name("Correction_Goals"), SectionTag::CorrectionGoals);
        assert_eq!(
            SectionTag::from_name("Verification_Report"),
            SectionTag::VerificationReport
        );
    }

    #[test]
    fn drifted_spellings_use_aliases() {
        assert_eq!(SectionTag::from_name("reply required"), SectionTag::ReplyRequired);
        assert_eq!(SectionTag::from_name("MODIFIED"), SectionTag::Modified);
        assert_eq!(SectionTag::from_name("Correction-Goals"), SectionTag::CorrectionGoals);
    }

    #[test]
    fn verification_variants_are_ignored() {
        assert_eq!(SectionTag::from_name("Verification"), SectionTag::Ignored);
        assert_eq!(SectionTag::from_name("verification-report"), SectionTag::Ignored);
    }

    #[test]
    fn unknown_tag_defaults_to_reply_required() {
        assert_eq!(SectionTag::from_name("Files_Needed"), SectionTag::ReplyRequired);
    }

    #[test]
    fn tag_embedded_in_markdown_header_is_found() {
        let found = match_tag_line("### %_Plan_% (draft)").expect("tag");
        assert_eq!(found.tag, SectionTag::Plan);
        assert_eq!(found.rest, "(draft)");
    }

    #[test]
    fn plain_line_has_no_tag() {
        assert!(match_tag_line("100% of tests pass").is_none());
    }

    #[test]
    fn every_marker_round_trips() {
        for (_, tag) in CANONICAL {
            let found = match_tag_line(tag.marker()).expect("marker");
            assert_eq!(found.tag, *tag);
        }
    }
}
