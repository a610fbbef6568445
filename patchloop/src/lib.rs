//! Multi-turn code repair driven by an external text generator.
//!
//! The generator speaks a `%_Tag_%`-delimited protocol: it asks for files,
//! sends unified-diff patches and signals completion. This crate keeps that
//! conversation on rails:
//!
//! - **[`core`]**: Pure, deterministic logic (response parsing, patch
//!   application, turn classification). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (generator process, working
//!   directory, config, prompt templates, turn logs).
//!
//! [`session`] coordinates both into the repair loop.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
