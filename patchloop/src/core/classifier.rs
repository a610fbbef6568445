//! Deterministic classification of a parsed turn into the next session action.
//!
//! Precedence, first match wins:
//!
//! 1. `Fin` or `VerificationReport` ends the session as completed.
//! 2. `NoChangesNeeded` asks for confirmation once, then ends the session.
//! 3. `ReadyForFinalCheck` asks for a final review.
//! 4. File requests are served.
//! 5. A patch is applied.
//! 6. Anything else is unproductive: a corrective prompt while retries
//!    remain, otherwise the session ends.

use crate::core::types::{DoneReason, FileRequest, ParsedTurn, TerminalSignal};

/// Session facts the classification depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifyContext {
    /// A no-changes confirmation prompt was already sent this session.
    pub verification_requested: bool,
    /// Corrective prompts still allowed for unproductive turns.
    pub corrective_retries_left: u32,
}

/// Prompt-only follow-ups that do not touch files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    ConfirmNoChanges,
    FinalCheck,
    Corrective,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Done(DoneReason),
    RequestFiles(Vec<FileRequest>),
    ApplyPatch(String),
    FollowUp(FollowUp),
}

pub fn classify(turn: &ParsedTurn, ctx: &ClassifyContext) -> Action {
    match turn.terminal {
        TerminalSignal::Fin | TerminalSignal::VerificationReport => {
            return Action::Done(DoneReason::Completed);
        }
        TerminalSignal::NoChangesNeeded if ctx.verification_requested => {
            return Action::Done(DoneReason::NoChangesNeeded);
        }
        TerminalSignal::NoChangesNeeded => return Action::FollowUp(FollowUp::ConfirmNoChanges),
        TerminalSignal::ReadyForFinalCheck => return Action::FollowUp(FollowUp::FinalCheck),
        TerminalSignal::None => {}
    }

    if !turn.required_files.is_empty() {
        return Action::RequestFiles(turn.required_files.clone());
    }
    if !turn.patch_text.trim().is_empty() {
        return Action::ApplyPatch(turn.patch_text.clone());
    }
    if ctx.corrective_retries_left > 0 {
        return Action::FollowUp(FollowUp::Corrective);
    }
    Action::Done(DoneReason::NoActionableContent)
}
