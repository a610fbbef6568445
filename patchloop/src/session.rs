//! Repair session: the conversation loop between a text generator and a
//! working tree.
//!
//! A session is one explicit loop over [`SessionState`]. Every path back to
//! `AwaitResponse` passes the turn-limit check, so the loop is bounded by
//! `max_turns` regardless of what the generator sends.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::classifier::{Action, ClassifyContext, FollowUp, classify};
use crate::core::diff::unified_diff;
use crate::core::parser::parse;
use crate::core::patch::Patch;
use crate::core::patch_apply::{Loaded, PatchOptions, apply};
use crate::core::types::{DoneReason, FileRequest, Message, ParsedTurn, RequestKind};
use crate::io::config::SessionConfig;
use crate::io::file_store::FileStore;
use crate::io::generator::TextGenerator;
use crate::io::prompt::{PatchReport, PromptEngine, ReplyEntry, TurnNotes};
use crate::io::turn_log::{TurnMeta, TurnWriteRequest, write_transcript, write_turn};

/// Result of a finished session.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub session_id: String,
    pub reason: DoneReason,
    /// Generator responses received.
    pub turns: u32,
    /// Paths written to the store, in first-write order.
    pub files_written: Vec<String>,
    pub transcript: Vec<Message>,
    pub last_turn: Option<ParsedTurn>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Start,
    PrepareContext,
    AwaitResponse,
    Classify,
    RequestFiles(Vec<FileRequest>),
    ApplyPatch(String),
    FollowUp(FollowUp),
    Done(DoneReason),
}

/// A response whose turn log is written once the reaction is known.
#[derive(Debug)]
struct PendingTurn {
    response: String,
    meta: TurnMeta,
}

/// Working memory of one run. Never shared between runs.
#[derive(Debug, Default)]
struct ConversationState {
    turn_count: u32,
    messages: Vec<Message>,
    last_parsed: Option<ParsedTurn>,
    /// Read-through cache, updated with every successful write.
    file_cache: BTreeMap<String, String>,
    correction_goals: Option<String>,
    verification_requested: bool,
    corrective_retries_used: u32,
    files_written: Vec<String>,
    pending: Option<PendingTurn>,
}

impl ConversationState {
    /// Keep the first non-empty correction goals of the run.
    fn remember_goals(&mut self, turn: &ParsedTurn) {
        if self.correction_goals.is_none()
            && let Some(goals) = turn
                .correction_goals
                .as_deref()
                .map(str::trim)
                .filter(|goals| !goals.is_empty())
        {
            self.correction_goals = Some(goals.to_string());
        }
    }

    fn record_written(&mut self, path: &str) {
        if !self.files_written.iter().any(|written| written == path) {
            self.files_written.push(path.to_string());
        }
    }
}

fn cache_key(path: &str) -> String {
    let path = path.trim();
    path.strip_prefix("./").unwrap_or(path).to_string()
}

fn read_through<S: FileStore>(
    store: &S,
    cache: &mut BTreeMap<String, String>,
    path: &str,
) -> Result<Option<String>> {
    let key = cache_key(path);
    if let Some(content) = cache.get(&key) {
        debug!(path = %key, "cache hit");
        return Ok(Some(content.clone()));
    }
    let content = store.read(&key)?;
    if let Some(content) = &content {
        cache.insert(key, content.clone());
    }
    Ok(content)
}

fn not_found_placeholder(path: &str, suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        format!("[file not found: {path}]")
    } else {
        format!(
            "[file not found: {path}; similar files: {}]",
            suggestions.join(", ")
        )
    }
}

fn follow_up_label(kind: FollowUp) -> &'static str {
    match kind {
        FollowUp::ConfirmNoChanges => "confirm_no_changes",
        FollowUp::FinalCheck => "final_check",
        FollowUp::Corrective => "corrective",
    }
}

fn new_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("session-{millis}-{}", std::process::id())
}

/// Drives one repair conversation.
pub struct Session<G, S> {
    generator: G,
    store: S,
    config: SessionConfig,
    prompts: PromptEngine,
    session_id: String,
}

impl<G: TextGenerator, S: FileStore> Session<G, S> {
    pub fn new(generator: G, store: S, config: SessionConfig) -> Self {
        Self {
            generator,
            store,
            config,
            prompts: PromptEngine::new(),
            session_id: new_session_id(),
        }
    }

    /// Name used for the per-turn log directory.
    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = id.into();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Run until a terminal classification or the turn limit.
    ///
    /// Generator errors end the run and are returned as-is.
    #[instrument(skip_all, fields(session_id = %self.session_id, max_turns = self.config.max_turns))]
    pub fn run(&self, initial_prompt: &str) -> Result<Outcome> {
        let mut state = ConversationState::default();
        let mut step = SessionState::Start;
        loop {
            step = match step {
                SessionState::Start => {
                    info!("session started");
                    SessionState::PrepareContext
                }
                SessionState::PrepareContext => {
                    let system = match &self.config.system_prompt {
                        Some(custom) => custom.clone(),
                        None => self.prompts.system()?,
                    };
                    state.messages.push(Message::system(system));
                    state.messages.push(Message::user(initial_prompt));
                    SessionState::AwaitResponse
                }
                SessionState::AwaitResponse => self.await_response(&mut state)?,
                SessionState::Classify => {
                    let Some(turn) = state.last_parsed.as_ref() else {
                        bail!("no parsed response to classify");
                    };
                    let ctx = ClassifyContext {
                        verification_requested: state.verification_requested,
                        corrective_retries_left: self
                            .config
                            .corrective_retries
                            .saturating_sub(state.corrective_retries_used),
                    };
                    match classify(turn, &ctx) {
                        Action::Done(reason) => SessionState::Done(reason),
                        Action::RequestFiles(requests) => SessionState::RequestFiles(requests),
                        Action::ApplyPatch(patch_text) => SessionState::ApplyPatch(patch_text),
                        Action::FollowUp(kind) => SessionState::FollowUp(kind),
                    }
                }
                SessionState::RequestFiles(requests) => {
                    let outbound = self.serve_files(&mut state, &requests)?;
                    self.send_next(&mut state, "request_files", outbound)?;
                    SessionState::AwaitResponse
                }
                SessionState::ApplyPatch(patch_text) => {
                    let outbound = self.apply_patch(&mut state, &patch_text)?;
                    self.send_next(&mut state, "apply_patch", outbound)?;
                    SessionState::AwaitResponse
                }
                SessionState::FollowUp(kind) => {
                    let outbound = self.follow_up(&mut state, kind)?;
                    self.send_next(&mut state, follow_up_label(kind), outbound)?;
                    SessionState::AwaitResponse
                }
                SessionState::Done(reason) => return self.finish(state, reason),
            };
        }
    }

    fn await_response(&self, state: &mut ConversationState) -> Result<SessionState> {
        if state.turn_count >= self.config.max_turns {
            warn!(turns = state.turn_count, "turn limit reached");
            return Ok(SessionState::Done(DoneReason::TurnLimitExceeded));
        }
        let response = self.generator.send(&state.messages)?;
        state.turn_count += 1;
        state.messages.push(Message::assistant(response.clone()));

        let parsed = parse(&response);
        debug!(
            turn = state.turn_count,
            terminal = ?parsed.terminal,
            requests = parsed.required_files.len(),
            has_patch = !parsed.patch_text.is_empty(),
            "response parsed"
        );
        state.remember_goals(&parsed);
        state.pending = Some(PendingTurn {
            meta: TurnMeta {
                session_id: self.session_id.clone(),
                turn: state.turn_count,
                action: String::new(),
                response_bytes: response.len(),
                patched_files: Vec::new(),
                warnings: Vec::new(),
                patch_error: None,
            },
            response,
        });
        state.last_parsed = Some(parsed);
        Ok(SessionState::Classify)
    }

    #[instrument(skip_all, fields(requests = requests.len()))]
    fn serve_files(
        &self,
        state: &mut ConversationState,
        requests: &[FileRequest],
    ) -> Result<String> {
        let mut files = Vec::new();
        let mut listings = Vec::new();
        for request in requests {
            match request.kind {
                RequestKind::FileContent => files.push(ReplyEntry {
                    path: request.path.clone(),
                    body: self.file_body(&mut state.file_cache, &request.path),
                }),
                RequestKind::DirectoryListing => listings.push(ReplyEntry {
                    path: request.path.clone(),
                    body: self.listing_body(&request.path),
                }),
            }
        }
        info!(
            files = files.len(),
            listings = listings.len(),
            "serving requested files"
        );

        let turn = state.last_parsed.as_ref();
        self.prompts.file_reply(
            &files,
            &listings,
            TurnNotes {
                thought: turn.and_then(|turn| turn.thought.as_deref()),
                plan: turn.and_then(|turn| turn.plan.as_deref()),
                comment: turn.map(|turn| turn.comment_text.as_str()),
                goals: state.correction_goals.as_deref(),
            },
        )
    }

    fn file_body(&self, cache: &mut BTreeMap<String, String>, path: &str) -> String {
        match read_through(&self.store, cache, path) {
            Ok(Some(content)) => content,
            Ok(None) => {
                debug!(path, "requested file not found");
                not_found_placeholder(path, &self.store.suggest_similar(path))
            }
            Err(err) => {
                warn!(path, err = %format!("{err:#}"), "requested file unreadable");
                format!("[could not read {path}: {err:#}]")
            }
        }
    }

    fn listing_body(&self, path: &str) -> String {
        match self.store.list(path, self.config.listing_depth) {
            Ok(Some(entries)) if entries.is_empty() => "[empty directory]".to_string(),
            Ok(Some(entries)) => entries.join("\n"),
            Ok(None) => format!("[directory not found: {path}]"),
            Err(err) => {
                warn!(path, err = %format!("{err:#}"), "directory listing failed");
                format!("[could not list {path}: {err:#}]")
            }
        }
    }

    #[instrument(skip_all, fields(patch_bytes = patch_text.len()))]
    fn apply_patch(&self, state: &mut ConversationState, patch_text: &str) -> Result<String> {
        let options = PatchOptions {
            strict_context: self.config.strict_context,
        };
        let store = &self.store;
        let cache = &mut state.file_cache;
        let applied = apply(
            patch_text,
            |path: &str| match read_through(store, cache, path) {
                Ok(content) => Loaded::from(content),
                Err(err) => {
                    warn!(path, err = %format!("{err:#}"), "patch target unreadable, edits skipped");
                    Loaded::Unreadable(format!("{err:#}"))
                }
            },
            options,
        );

        let result = match applied {
            Ok(result) => result,
            Err(err) => {
                warn!(kind = err.kind(), line = err.line(), "patch rejected");
                if let Some(pending) = state.pending.as_mut() {
                    pending.meta.patch_error = Some(err.to_string());
                }
                return self
                    .prompts
                    .patch_error(&err, patch_text, state.correction_goals.as_deref());
            }
        };

        let mut diff = String::new();
        let mut write_failures = Vec::new();
        for file in &result.files {
            let key = cache_key(&file.path);
            let old = state.file_cache.get(&key).map_or("", String::as_str);
            diff.push_str(&unified_diff(&file.path, old, &file.content));
            match self.store.write(&file.path, &file.content) {
                Ok(()) => {
                    state.file_cache.insert(key, file.content.clone());
                    state.record_written(&file.path);
                }
                Err(err) => {
                    warn!(path = %file.path, err = %format!("{err:#}"), "write failed");
                    write_failures.push(format!("{}: {err:#}", file.path));
                }
            }
        }
        let warnings: Vec<String> = result.warnings.iter().map(ToString::to_string).collect();
        let (added, removed) = Patch::parse(patch_text).map_or((0, 0), |patch| patch.line_counts());
        info!(
            files = result.files.len(),
            warnings = warnings.len(),
            write_failures = write_failures.len(),
            "patch applied"
        );
        if let Some(pending) = state.pending.as_mut() {
            pending.meta.patched_files = result.files.iter().map(|f| f.path.clone()).collect();
            pending.meta.warnings = warnings.clone();
        }

        let rendered = result.rendered();
        self.prompts.patch_result(&PatchReport {
            rendered: &rendered,
            diff: &diff,
            added,
            removed,
            warnings,
            write_failures,
            goals: state.correction_goals.as_deref(),
        })
    }

    fn follow_up(&self, state: &mut ConversationState, kind: FollowUp) -> Result<String> {
        let goals = state.correction_goals.as_deref();
        match kind {
            FollowUp::ConfirmNoChanges => {
                state.verification_requested = true;
                let comment = state
                    .last_parsed
                    .as_ref()
                    .map(|turn| turn.comment_text.as_str());
                self.prompts.verify_no_changes(comment, goals)
            }
            FollowUp::FinalCheck => {
                state.verification_requested = true;
                self.prompts.final_check(&state.files_written, goals)
            }
            FollowUp::Corrective => {
                state.corrective_retries_used += 1;
                info!(
                    used = state.corrective_retries_used,
                    allowed = self.config.corrective_retries,
                    "unproductive response, sending corrective prompt"
                );
                self.prompts.corrective(goals)
            }
        }
    }

    fn send_next(&self, state: &mut ConversationState, action: &str, outbound: String) -> Result<()> {
        self.log_turn(state, action, Some(&outbound))?;
        state.messages.push(Message::user(outbound));
        Ok(())
    }

    fn log_turn(
        &self,
        state: &mut ConversationState,
        action: &str,
        outbound: Option<&str>,
    ) -> Result<()> {
        let Some(mut pending) = state.pending.take() else {
            return Ok(());
        };
        let (Some(log_dir), Some(parsed)) = (&self.config.log_dir, state.last_parsed.as_ref())
        else {
            return Ok(());
        };
        pending.meta.action = action.to_string();
        write_turn(&TurnWriteRequest {
            log_dir,
            session_id: &self.session_id,
            meta: &pending.meta,
            response: &pending.response,
            parsed,
            outbound,
        })?;
        Ok(())
    }

    fn finish(&self, mut state: ConversationState, reason: DoneReason) -> Result<Outcome> {
        self.log_turn(&mut state, &format!("done:{}", reason.as_str()), None)?;
        if let Some(log_dir) = &self.config.log_dir {
            write_transcript(log_dir, &self.session_id, &state.messages)?;
        }
        info!(
            reason = reason.as_str(),
            turns = state.turn_count,
            files_written = state.files_written.len(),
            "session finished"
        );
        Ok(Outcome {
            session_id: self.session_id.clone(),
            reason,
            turns: state.turn_count,
            files_written: state.files_written,
            transcript: state.messages,
            last_turn: state.last_parsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryFileStore, ScriptedGenerator};

    fn config() -> SessionConfig {
        SessionConfig::default()
    }

    #[test]
    fn transcript_starts_with_system_and_prompt() {
        let generator = ScriptedGenerator::new(["%%_Fin_%%"]);
        let store = MemoryFileStore::default();
        let outcome = Session::new(&generator, &store, config())
            .run("fix the bug")
            .expect("run");
        assert_eq!(outcome.reason, DoneReason::Completed);
        assert_eq!(outcome.turns, 1);
        let sent = generator.transcripts();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), 2);
        assert_eq!(sent[0][0].role, crate::core::types::Role::System);
        assert_eq!(sent[0][1].content, "fix the bug");
    }

    #[test]
    fn custom_system_prompt_replaces_builtin() {
        let generator = ScriptedGenerator::new(["%%_Fin_%%"]);
        let store = MemoryFileStore::default();
        let cfg = SessionConfig {
            system_prompt: Some("be brief".to_string()),
            ..config()
        };
        Session::new(&generator, &store, cfg)
            .run("go")
            .expect("run");
        assert_eq!(generator.transcripts()[0][0].content, "be brief");
    }

    #[test]
    fn cache_serves_repeat_reads() {
        let generator = ScriptedGenerator::new([
            "%_Reply Required_%\n[\"a.txt\"]",
            "%_Reply Required_%\n[\"./a.txt\"]",
            "%%_Fin_%%",
        ]);
        let store = MemoryFileStore::with_files([("a.txt", "one\n")]);
        let outcome = Session::new(&generator, &store, config())
            .run("go")
            .expect("run");
        assert_eq!(outcome.reason, DoneReason::Completed);
        assert_eq!(store.reads("a.txt"), 1);
    }

    #[test]
    fn correction_goals_are_replayed_in_later_prompts() {
        let generator = ScriptedGenerator::new([
            "%_Correction_Goals_%\nkeep the API stable\n%_Reply Required_%\n[\"a.txt\"]",
            "%_Correction_Goals_%\nsomething else\n%_Reply Required_%\n[\"b.txt\"]",
            "%%_Fin_%%",
        ]);
        let store = MemoryFileStore::with_files([("a.txt", "a\n"), ("b.txt", "b\n")]);
        Session::new(&generator, &store, config())
            .run("go")
            .expect("run");
        let last = generator.transcripts().pop().expect("transcript");
        let reply = &last[last.len() - 1].content;
        assert!(reply.contains("keep the API stable"));
        assert!(!reply.contains("something else"));
    }

    #[test]
    fn session_logs_each_turn() {
        let temp = tempfile::tempdir().expect("tempdir");
        let generator = ScriptedGenerator::new(["%_Reply Required_%\n[\"a.txt\"]", "%%_Fin_%%"]);
        let store = MemoryFileStore::with_files([("a.txt", "a\n")]);
        let cfg = SessionConfig {
            log_dir: Some(temp.path().to_path_buf()),
            ..config()
        };
        Session::new(&generator, &store, cfg)
            .with_session_id("s-test")
            .run("go")
            .expect("run");
        let dir = temp.path().join("s-test");
        assert!(dir.join("1/outbound.md").is_file());
        assert!(dir.join("2/meta.json").is_file());
        assert!(!dir.join("2/outbound.md").exists());
        assert!(dir.join("transcript.json").is_file());
        let meta = std::fs::read_to_string(dir.join("1/meta.json")).expect("meta");
        assert!(meta.contains("\"action\": \"request_files\""));
    }
}
