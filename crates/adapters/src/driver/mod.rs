// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent driver abstraction.
//!
//! A driver owns one agent's lifecycle: it accepts prompts, invokes the
//! external CLI, streams normalized output lines to observers, and is the
//! only writer of its agent's status. Per-CLI differences (argument
//! shape, event vocabulary) are expressed as a [`CliProfile`]; everything
//! else (prompt queueing, timeouts, stderr surfacing, observer fan-out)
//! is shared in [`CliDriver`].

mod action;
mod claude;
mod codex;
mod stderr;
mod turn;

pub use claude::{ClaudeDriver, ClaudeProfile};
pub use codex::{CodexDriver, CodexProfile};
pub use stderr::{StderrPattern, StderrPatternTable};
pub use turn::CliDriver;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeDriver;

use async_trait::async_trait;
use fedi_core::{AgentId, AgentStatus, OutputLine};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Errors from driver operations
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("driver not started")]
    NotStarted,
    #[error("driver stopped")]
    Stopped,
}

/// Observer of normalized output lines.
pub type OutputHandler = Arc<dyn Fn(AgentId, &OutputLine) + Send + Sync>;

/// Observer of status transitions.
pub type StatusHandler = Arc<dyn Fn(AgentId, AgentStatus) + Send + Sync>;

/// Configuration for one driver instance.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub agent_id: AgentId,
    /// CLI binary to invoke for each turn.
    pub cli_path: String,
    /// Model override handed through to the CLI.
    pub model: Option<String>,
    /// Wall-clock budget per turn. `None` waits indefinitely.
    pub turn_timeout: Option<Duration>,
    /// Working directory for the subprocess.
    pub workdir: PathBuf,
    /// Stderr classification table.
    pub stderr_patterns: StderrPatternTable,
}

impl DriverConfig {
    pub fn new(agent_id: AgentId, cli_path: impl Into<String>, workdir: PathBuf) -> Self {
        Self {
            agent_id,
            cli_path: cli_path.into(),
            model: None,
            turn_timeout: Some(Duration::from_millis(120_000)),
            workdir,
            stderr_patterns: StderrPatternTable::default(),
        }
    }
}

/// What one decoded event means for the turn in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    /// The CLI announced its session id; keep it for `--resume`.
    CaptureSession(String),
    /// Emit a normalized output line to observers.
    Emit(OutputLine),
    /// The turn reached its terminal event, optionally with final text.
    Terminal { final_text: Option<String> },
    /// The CLI reported a recoverable error; surface it and stay alive.
    Failure(String),
}

/// Per-CLI knowledge: how to invoke the binary and read its events.
pub trait CliProfile: Send + Sync + 'static {
    /// Build the command for one turn.
    ///
    /// `resume` is the external session id captured on a previous turn;
    /// `system_prompt` is set only on the first turn of a fresh session.
    fn build_command(
        &self,
        config: &DriverConfig,
        prompt: &str,
        resume: Option<&str>,
        system_prompt: Option<&str>,
    ) -> Command;

    /// Map one decoded event object to turn actions.
    fn map_event(&self, event: &serde_json::Value) -> Vec<EventAction>;
}

/// Driver contract shared by every agent.
#[async_trait]
pub trait AgentDriver: Send + Sync {
    fn agent_id(&self) -> AgentId;

    /// Verify the CLI is invocable and start the turn loop.
    ///
    /// `system_prompt` is injected into the first turn of a fresh
    /// session. Fails with [`DriverError::Spawn`] when the binary is not
    /// executable. Idempotent.
    async fn start(&self, system_prompt: Option<String>) -> Result<(), DriverError>;

    /// Queue a prompt; dispatched immediately unless a turn is running.
    async fn send(&self, prompt: String) -> Result<(), DriverError>;

    /// Terminate the agent: grace period, then kill. Idempotent.
    async fn stop(&self);

    fn status(&self) -> AgentStatus;

    /// Prompts queued but not yet dispatched (excludes the running turn).
    fn queue_depth(&self) -> usize;

    /// External session id captured from the CLI, if any.
    fn external_session_id(&self) -> Option<String>;

    /// Pre-load an external session id so the next spawn resumes it.
    fn resume_session(&self, external_id: String);

    fn last_error(&self) -> Option<String>;

    fn on_output(&self, handler: OutputHandler);

    fn on_status_change(&self, handler: StatusHandler);
}

/// Resolve `cli_path` to an executable file.
///
/// Paths with a separator are checked directly; bare names are searched
/// on `PATH`. This is the `SpawnError` gate of `start()`; failing early
/// beats a confusing mid-turn spawn error.
pub(crate) fn ensure_executable(cli_path: &str) -> Result<PathBuf, DriverError> {
    let candidates: Vec<PathBuf> = if cli_path.contains(std::path::MAIN_SEPARATOR) {
        vec![PathBuf::from(cli_path)]
    } else {
        std::env::var_os("PATH")
            .map(|paths| {
                std::env::split_paths(&paths)
                    .map(|dir| dir.join(cli_path))
                    .collect()
            })
            .unwrap_or_default()
    };

    for candidate in candidates {
        if is_executable(&candidate) {
            return Ok(candidate);
        }
    }
    Err(DriverError::Spawn(format!(
        "binary not executable: {cli_path}"
    )))
}

#[cfg(unix)]
fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &std::path::Path) -> bool {
    path.is_file()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
