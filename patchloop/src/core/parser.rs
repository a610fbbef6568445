//! Response parser: raw generator text to [`ParsedTurn`].
//!
//! Parsing never fails. Input that matches nothing yields an empty turn with
//! [`TerminalSignal::None`], which the session loop treats as unproductive.
//!
//! Order of evaluation:
//!
//! 1. Whole-text terminal markers ([`FIN_MARKER`], then [`NO_CHANGES_MARKER`]).
//! 2. Standalone JSON fast path for generators that skip the tag protocol.
//! 3. Line scan over `%_Tag_%` sections into a local accumulator.
//! 4. Reply-required resolution, then plan-derived discovery.
//! 5. Deduplication of file requests by path.

use serde_json::Value;
use tracing::debug;

use crate::core::json_scan::extract_balanced;
use crate::core::plan_files::files_from_plan;
use crate::core::reply_required::{requests_from_value, resolve};
use crate::core::tags::{FIN_MARKER, NO_CHANGES_MARKER, SectionTag, match_tag_line};
use crate::core::types::{FileRequest, ParsedTurn, TerminalSignal};

/// Parse one generator response.
pub fn parse(raw: &str) -> ParsedTurn {
    if raw.contains(FIN_MARKER) {
        debug!("fin marker found");
        return ParsedTurn::with_terminal(TerminalSignal::Fin);
    }
    if raw.contains(NO_CHANGES_MARKER) {
        debug!("no-changes marker found");
        return ParsedTurn::with_terminal(TerminalSignal::NoChangesNeeded);
    }

    if let Some(turn) = parse_standalone_json(raw) {
        debug!(files = turn.required_files.len(), "standalone json response");
        return finish(turn);
    }

    let (sections, terminal) = scan_sections(raw);
    let mut turn = sections.into_turn();
    if terminal != TerminalSignal::None {
        turn.required_files.clear();
        turn.patch_text.clear();
        turn.terminal = terminal;
        return turn;
    }
    finish(turn)
}

/// Section buffers for one parse. Each tag feeds exactly one buffer.
#[derive(Debug, Default)]
struct Sections {
    thought: Vec<String>,
    plan: Vec<String>,
    correction_goals: Vec<String>,
    reply_required: Vec<String>,
    modified: Vec<String>,
    comment: Vec<String>,
}

impl Sections {
    /// Dispatch table from tag to buffer. `None` means content is discarded.
    fn buffer(&mut self, tag: SectionTag) -> Option<&mut Vec<String>> {
        match tag {
            SectionTag::Thought => Some(&mut self.thought),
            SectionTag::Plan => Some(&mut self.plan),
            SectionTag::CorrectionGoals => Some(&mut self.correction_goals),
            SectionTag::ReplyRequired => Some(&mut self.reply_required),
            SectionTag::Modified => Some(&mut self.modified),
            SectionTag::Comment => Some(&mut self.comment),
            SectionTag::Ignored
            | SectionTag::VerificationReport
            | SectionTag::ReadyForFinalCheck => None,
        }
    }

    fn into_turn(self) -> ParsedTurn {
        ParsedTurn {
            thought: joined_opt(&self.thought),
            plan: joined_opt(&self.plan),
            correction_goals: joined_opt(&self.correction_goals),
            required_files: resolve(&joined(&self.reply_required)),
            patch_text: joined(&self.modified),
            comment_text: joined(&self.comment),
            terminal: TerminalSignal::None,
        }
    }
}

fn joined(lines: &[String]) -> String {
    lines.join("\n").trim().to_string()
}

fn joined_opt(lines: &[String]) -> Option<String> {
    let text = joined(lines);
    (!text.is_empty()).then_some(text)
}

/// Walk the lines, switching buffers on each delimiter.
///
/// Text before the first delimiter is dropped. A line-scan terminal stops the
/// walk and is returned alongside whatever was accumulated so far.
fn scan_sections(raw: &str) -> (Sections, TerminalSignal) {
    let mut sections = Sections::default();
    let mut current: Option<SectionTag> = None;

    for line in raw.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(found) = match_tag_line(line) {
            match found.tag {
                SectionTag::VerificationReport => {
                    return (sections, TerminalSignal::VerificationReport);
                }
                SectionTag::ReadyForFinalCheck => {
                    return (sections, TerminalSignal::ReadyForFinalCheck);
                }
                tag => {
                    current = Some(tag);
                    if !found.rest.is_empty()
                        && let Some(buf) = sections.buffer(tag)
                    {
                        buf.push(found.rest.to_string());
                    }
                }
            }
            continue;
        }
        if let Some(tag) = current
            && let Some(buf) = sections.buffer(tag)
        {
            buf.push(line.to_string());
        }
    }
    (sections, TerminalSignal::None)
}

/// Fast path for a response that is nothing but a JSON array or object.
fn parse_standalone_json(raw: &str) -> Option<ParsedTurn> {
    let trimmed = raw.trim();
    let starts_structured = trimmed.starts_with('[') || trimmed.starts_with('{');
    if !starts_structured {
        return None;
    }
    if !["\"path\"", "\"filePath\"", "\"action\""]
        .iter()
        .any(|key| trimmed.contains(key))
    {
        return None;
    }
    // Must be a single value with nothing trailing.
    if extract_balanced(trimmed)?.len() != trimmed.len() {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;

    let plan = match &value {
        Value::Array(items) if !items.is_empty() && items.iter().all(is_plan_step) => {
            serde_json::to_string_pretty(&value).ok()
        }
        _ => None,
    };

    Some(ParsedTurn {
        plan,
        required_files: requests_from_value(&value),
        ..ParsedTurn::default()
    })
}

fn is_plan_step(item: &Value) -> bool {
    item.get("action").is_some() || item.get("step").is_some()
}

fn finish(mut turn: ParsedTurn) -> ParsedTurn {
    if turn.required_files.is_empty()
        && let Some(plan) = &turn.plan
    {
        turn.required_files = files_from_plan(plan);
    }
    turn.required_files = dedup_by_path(turn.required_files);
    turn
}

/// Keep the first request for each path, preserving order.
pub fn dedup_by_path(requests: Vec<FileRequest>) -> Vec<FileRequest> {
    let mut out: Vec<FileRequest> = Vec::with_capacity(requests.len());
    for request in requests {
        if !out.iter().any(|seen| seen.path == request.path) {
            out.push(request);
        }
    }
    out
}
