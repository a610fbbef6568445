//! Deterministic, pure logic shared by the repair loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! text and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod diff;
pub mod json_scan;
pub mod parser;
pub mod patch;
pub mod patch_apply;
pub mod plan_files;
pub mod render;
pub mod reply_required;
pub mod similarity;
pub mod tags;
pub mod types;
