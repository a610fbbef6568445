//! Side-effecting collaborators of the repair loop.

pub mod config;
pub mod file_store;
pub mod generator;
pub mod process;
pub mod prompt;
pub mod turn_log;
