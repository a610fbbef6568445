//! Text generator abstraction.
//!
//! The [`TextGenerator`] trait decouples the session loop from whatever
//! produces responses. [`CommandGenerator`] runs an external program per
//! turn; tests use scripted generators that replay canned responses.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::types::Message;
use crate::io::config::GeneratorConfig;
use crate::io::process::run_command_with_timeout;

/// Produces the next response for a transcript.
///
/// Errors propagate to the session's caller unchanged; the session never
/// retries a failed call.
pub trait TextGenerator {
    fn send(&self, transcript: &[Message]) -> Result<String>;
}

impl<T: TextGenerator + ?Sized> TextGenerator for &T {
    fn send(&self, transcript: &[Message]) -> Result<String> {
        (**self).send(transcript)
    }
}

/// Stdin payload for [`CommandGenerator`].
#[derive(Debug, Serialize)]
struct GeneratorRequest<'a> {
    messages: &'a [Message],
}

/// Runs a configured command once per turn.
///
/// The command receives `{"messages": [...]}` on stdin and must print the
/// response text on stdout and exit 0.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    workdir: Option<PathBuf>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandGenerator {
    pub fn from_config(cfg: &GeneratorConfig) -> Result<Self> {
        let (program, args) = cfg
            .command
            .split_first()
            .ok_or_else(|| anyhow!("generator.command must be a non-empty array"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            workdir: None,
            timeout: Duration::from_secs(cfg.timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
        })
    }

    /// Run the command from `dir` instead of the current directory.
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }
}

impl TextGenerator for CommandGenerator {
    #[instrument(skip_all, fields(program = %self.program, messages = transcript.len()))]
    fn send(&self, transcript: &[Message]) -> Result<String> {
        let payload = serde_json::to_vec(&GeneratorRequest {
            messages: transcript,
        })
        .context("serialize transcript")?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        info!("calling generator");
        let output =
            run_command_with_timeout(cmd, Some(payload), self.timeout, self.output_limit_bytes)
                .with_context(|| format!("run generator {}", self.program))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "generator timed out");
            return Err(anyhow!("generator timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "generator failed");
            return Err(anyhow!(
                "generator exited with status {:?}: {}",
                output.status.code(),
                output.stderr_tail(5)
            ));
        }
        if output.stdout_truncated > 0 {
            warn!(
                dropped = output.stdout_truncated,
                "generator response truncated"
            );
        }
        let response = output.stdout_text();
        debug!(bytes = response.len(), "generator responded");
        Ok(response)
    }
}
