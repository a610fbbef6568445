//! Stable exit codes for the `patchloop` CLI.

use crate::core::types::DoneReason;

/// Session completed, the generator confirmed no changes, or the command succeeded.
pub const OK: i32 = 0;
/// Invalid input, configuration or a generator failure.
pub const ERROR: i32 = 1;
/// The generator produced a response with nothing to act on.
pub const NO_ACTIONABLE_CONTENT: i32 = 2;
/// The turn limit was reached.
pub const TURN_LIMIT: i32 = 3;

pub fn for_reason(reason: DoneReason) -> i32 {
    match reason {
        DoneReason::Completed | DoneReason::NoChangesNeeded => OK,
        DoneReason::NoActionableContent => NO_ACTIONABLE_CONTENT,
        DoneReason::TurnLimitExceeded => TURN_LIMIT,
    }
}
