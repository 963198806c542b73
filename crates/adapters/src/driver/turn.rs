// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared turn machinery for CLI-backed drivers.
//!
//! One background loop per driver owns the agent end to end: it pops
//! prompts in FIFO order, invokes the CLI, pumps stdout through the
//! event decoder and stderr through the pattern table, enforces the turn
//! timeout, and is the only writer of the agent's status. Events for one
//! agent are therefore strictly ordered; events for different agents
//! interleave freely on the runtime.

use super::{
    ensure_executable, AgentDriver, CliProfile, DriverConfig, DriverError, EventAction,
    OutputHandler, StatusHandler,
};
use crate::stream::EventStreamDecoder;
use async_trait::async_trait;
use fedi_core::{AgentId, AgentStatus, OutputLine};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::{watch, Notify};

/// Grace period between terminate and kill on stop/timeout.
const STOP_GRACE: Duration = Duration::from_secs(5);

struct DriverState {
    status: AgentStatus,
    queue: VecDeque<String>,
    external_session_id: Option<String>,
    last_error: Option<String>,
    system_prompt: Option<String>,
    started: bool,
    output_handlers: Vec<OutputHandler>,
    status_handlers: Vec<StatusHandler>,
}

/// Generic driver over one [`CliProfile`].
pub struct CliDriver<P: CliProfile> {
    profile: Arc<P>,
    config: DriverConfig,
    state: Arc<Mutex<DriverState>>,
    wake: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<P: CliProfile> CliDriver<P> {
    pub fn new(profile: P, config: DriverConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            profile: Arc::new(profile),
            config,
            state: Arc::new(Mutex::new(DriverState {
                status: AgentStatus::Idle,
                queue: VecDeque::new(),
                external_session_id: None,
                last_error: None,
                system_prompt: None,
                started: false,
                output_handlers: Vec::new(),
                status_handlers: Vec::new(),
            })),
            wake: Arc::new(Notify::new()),
            shutdown_tx,
            shutdown_rx,
        }
    }
}

#[async_trait]
impl<P: CliProfile> AgentDriver for CliDriver<P> {
    fn agent_id(&self) -> AgentId {
        self.config.agent_id
    }

    async fn start(&self, system_prompt: Option<String>) -> Result<(), DriverError> {
        ensure_executable(&self.config.cli_path)?;

        {
            let mut state = self.state.lock();
            if state.started {
                return Ok(());
            }
            state.started = true;
            state.system_prompt = system_prompt;
            if state.status == AgentStatus::Stopped {
                state.status = AgentStatus::Idle;
            }
        }

        let runner = TurnLoop {
            profile: Arc::clone(&self.profile),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            wake: Arc::clone(&self.wake),
            shutdown_rx: self.shutdown_rx.clone(),
        };
        tokio::spawn(runner.run());
        tracing::debug!(agent_id = %self.config.agent_id, "driver started");
        Ok(())
    }

    async fn send(&self, prompt: String) -> Result<(), DriverError> {
        {
            let mut state = self.state.lock();
            if !state.started {
                return Err(DriverError::NotStarted);
            }
            if *self.shutdown_rx.borrow() {
                return Err(DriverError::Stopped);
            }
            state.queue.push_back(prompt);
        }
        self.wake.notify_one();
        Ok(())
    }

    async fn stop(&self) {
        let was_started = self.state.lock().started;
        let _ = self.shutdown_tx.send(true);
        self.wake.notify_one();

        if was_started {
            // Wait for the loop to acknowledge, then give up and stamp the
            // status ourselves so stop() is always terminal.
            let deadline = tokio::time::Instant::now() + STOP_GRACE;
            while self.status() != AgentStatus::Stopped {
                if tokio::time::Instant::now() >= deadline {
                    tracing::warn!(agent_id = %self.config.agent_id, "stop grace elapsed");
                    break;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        }
        set_status(&self.config.agent_id, &self.state, AgentStatus::Stopped);
    }

    fn status(&self) -> AgentStatus {
        self.state.lock().status
    }

    fn queue_depth(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn external_session_id(&self) -> Option<String> {
        self.state.lock().external_session_id.clone()
    }

    fn resume_session(&self, external_id: String) {
        self.state.lock().external_session_id = Some(external_id);
    }

    fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    fn on_output(&self, handler: OutputHandler) {
        self.state.lock().output_handlers.push(handler);
    }

    fn on_status_change(&self, handler: StatusHandler) {
        self.state.lock().status_handlers.push(handler);
    }
}

/// How one turn ended.
enum TurnOutcome {
    /// Terminal event seen; context stays warm.
    Terminal,
    /// Stream closed without a terminal event.
    Eof,
    /// Wall-clock budget exhausted.
    TimedOut,
    /// Driver shutdown requested mid-turn.
    Stopped,
}

struct TurnLoop<P: CliProfile> {
    profile: Arc<P>,
    config: DriverConfig,
    state: Arc<Mutex<DriverState>>,
    wake: Arc<Notify>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<P: CliProfile> TurnLoop<P> {
    async fn run(mut self) {
        loop {
            let Some(prompt) = self.next_prompt().await else {
                break;
            };

            set_status(&self.config.agent_id, &self.state, AgentStatus::Running);
            match self.run_turn(&prompt).await {
                TurnOutcome::Terminal | TurnOutcome::Eof => {}
                TurnOutcome::TimedOut => {}
                TurnOutcome::Stopped => break,
            }
        }
        set_status(&self.config.agent_id, &self.state, AgentStatus::Stopped);
        tracing::debug!(agent_id = %self.config.agent_id, "turn loop exited");
    }

    /// Block until a prompt is queued; `None` means shutdown.
    async fn next_prompt(&mut self) -> Option<String> {
        loop {
            if *self.shutdown_rx.borrow() {
                return None;
            }
            if let Some(prompt) = self.state.lock().queue.pop_front() {
                return Some(prompt);
            }
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = self.shutdown_rx.changed() => {}
            }
        }
    }

    async fn run_turn(&mut self, prompt: &str) -> TurnOutcome {
        // Local clone so the select below does not hold a field borrow
        // across the handler bodies.
        let mut shutdown_rx = self.shutdown_rx.clone();
        let (resume, system_prompt) = {
            let mut state = self.state.lock();
            let resume = state.external_session_id.clone();
            // The system prompt rides only on the first fresh invocation.
            let system_prompt = if resume.is_none() {
                state.system_prompt.take()
            } else {
                None
            };
            (resume, system_prompt)
        };

        let mut command = self.profile.build_command(
            &self.config,
            prompt,
            resume.as_deref(),
            system_prompt.as_deref(),
        );
        command
            .current_dir(&self.config.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("échec de lancement / spawn failed: {e}");
                tracing::warn!(agent_id = %self.config.agent_id, error = %e, "spawn failed");
                self.emit(OutputLine::info(message.clone()));
                self.state.lock().last_error = Some(message);
                set_status(&self.config.agent_id, &self.state, AgentStatus::Error);
                return TurnOutcome::Eof;
            }
        };

        let Some(mut stdout) = child.stdout.take() else {
            set_status(&self.config.agent_id, &self.state, AgentStatus::Error);
            return TurnOutcome::Eof;
        };
        let mut stderr_lines = child.stderr.take().map(|s| BufReader::new(s).lines());

        let timeout = self.config.turn_timeout;
        let timeout_fut = async move {
            match timeout {
                Some(budget) => tokio::time::sleep(budget).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(timeout_fut);

        let mut decoder = EventStreamDecoder::new();
        let mut buf = [0u8; 4096];
        let mut stderr_open = stderr_lines.is_some();

        let outcome = loop {
            tokio::select! {
                read = stdout.read(&mut buf) => match read {
                    Ok(0) => {
                        let trailing = decoder.finish();
                        if let Some(event) = trailing {
                            if self.apply_event(&event) {
                                break TurnOutcome::Terminal;
                            }
                        }
                        break TurnOutcome::Eof;
                    }
                    Ok(n) => {
                        let mut terminal = false;
                        for event in decoder.feed(&buf[..n]) {
                            terminal = self.apply_event(&event) || terminal;
                        }
                        if terminal {
                            break TurnOutcome::Terminal;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(agent_id = %self.config.agent_id, error = %e, "stdout read failed");
                        break TurnOutcome::Eof;
                    }
                },
                line = read_stderr(&mut stderr_lines), if stderr_open => match line {
                    Some(line) => self.handle_stderr(&line),
                    None => stderr_open = false,
                },
                _ = &mut timeout_fut => break TurnOutcome::TimedOut,
                _ = shutdown_rx.changed() => break TurnOutcome::Stopped,
            }
        };

        match outcome {
            TurnOutcome::Terminal => {
                reap(&self.config.agent_id, &mut child, false).await;
                // A mid-turn failure leaves the status on Error; the next
                // prompt retries from there.
                if self.state.lock().status != AgentStatus::Error {
                    set_status(&self.config.agent_id, &self.state, AgentStatus::Waiting);
                }
                TurnOutcome::Terminal
            }
            TurnOutcome::Eof => {
                let status = tokio::time::timeout(STOP_GRACE, child.wait()).await;
                match status {
                    Ok(Ok(exit)) if exit.success() => {
                        // Clean exit without a terminal event still ends the turn.
                        if self.state.lock().status != AgentStatus::Error {
                            set_status(&self.config.agent_id, &self.state, AgentStatus::Waiting);
                        }
                    }
                    Ok(Ok(exit)) => {
                        let code = exit.code().unwrap_or(-1);
                        let message =
                            format!("le processus s'est arrêté / process exited with code {code}");
                        self.emit(OutputLine::info(message.clone()));
                        self.state.lock().last_error = Some(message);
                        set_status(&self.config.agent_id, &self.state, AgentStatus::Error);
                    }
                    _ => {
                        reap(&self.config.agent_id, &mut child, true).await;
                        set_status(&self.config.agent_id, &self.state, AgentStatus::Error);
                    }
                }
                TurnOutcome::Eof
            }
            TurnOutcome::TimedOut => {
                reap(&self.config.agent_id, &mut child, true).await;
                let budget = self
                    .config
                    .turn_timeout
                    .map(|d| d.as_secs())
                    .unwrap_or_default();
                let message = format!("délai dépassé / timed out after {budget}s");
                self.emit(OutputLine::info(message.clone()));
                {
                    let mut state = self.state.lock();
                    state.last_error = Some(message);
                }
                set_status(&self.config.agent_id, &self.state, AgentStatus::Error);
                set_status(&self.config.agent_id, &self.state, AgentStatus::Idle);
                TurnOutcome::TimedOut
            }
            TurnOutcome::Stopped => {
                reap(&self.config.agent_id, &mut child, true).await;
                TurnOutcome::Stopped
            }
        }
    }

    /// Apply one decoded event; returns true when the turn is terminal.
    fn apply_event(&self, event: &serde_json::Value) -> bool {
        let mut terminal = false;
        for action in self.profile.map_event(event) {
            match action {
                EventAction::CaptureSession(sid) => {
                    tracing::debug!(agent_id = %self.config.agent_id, session_id = %sid, "captured external session");
                    self.state.lock().external_session_id = Some(sid);
                }
                EventAction::Emit(line) => self.emit(line),
                EventAction::Failure(message) => {
                    self.state.lock().last_error = Some(message.clone());
                    self.emit(OutputLine::info(message));
                    set_status(&self.config.agent_id, &self.state, AgentStatus::Error);
                }
                EventAction::Terminal { final_text } => {
                    if let Some(text) = final_text {
                        if !text.trim().is_empty() {
                            self.emit(OutputLine::stdout(text));
                        }
                    }
                    terminal = true;
                }
            }
        }
        terminal
    }

    fn handle_stderr(&self, line: &str) {
        match self.config.stderr_patterns.match_line(line) {
            Some(summary) => {
                self.state.lock().last_error = Some(summary.clone());
                self.emit(OutputLine::info(summary));
                set_status(&self.config.agent_id, &self.state, AgentStatus::Error);
            }
            None => {
                tracing::debug!(agent_id = %self.config.agent_id, line, "agent stderr");
            }
        }
    }

    fn emit(&self, line: OutputLine) {
        let handlers: Vec<OutputHandler> = self.state.lock().output_handlers.clone();
        for handler in handlers {
            handler(self.config.agent_id, &line);
        }
    }
}

type StderrLines = tokio::io::Lines<BufReader<tokio::process::ChildStderr>>;

/// Next stderr line; `None` once the pipe closes (caller disables the branch).
async fn read_stderr(lines: &mut Option<StderrLines>) -> Option<String> {
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}

/// Terminate the child: optional immediate termination signal, graceful
/// wait, then kill.
async fn reap(agent_id: &AgentId, child: &mut tokio::process::Child, terminate: bool) {
    if terminate {
        let _ = child.start_kill();
    }
    if tokio::time::timeout(STOP_GRACE, child.wait()).await.is_err() {
        tracing::debug!(%agent_id, "grace elapsed, killing child");
        let _ = child.kill().await;
    }
}

/// Transition the status, notifying observers outside the lock.
///
/// Illegal edges are logged and dropped so a late event cannot corrupt
/// the machine.
fn set_status(agent_id: &AgentId, state: &Arc<Mutex<DriverState>>, to: AgentStatus) {
    let handlers: Vec<StatusHandler> = {
        let mut state = state.lock();
        let from = state.status;
        if from == to {
            return;
        }
        if !AgentStatus::can_transition(from, to) {
            tracing::warn!(%agent_id, %from, %to, "illegal status transition dropped");
            return;
        }
        state.status = to;
        state.status_handlers.clone()
    };
    tracing::debug!(%agent_id, status = %to, "status changed");
    for handler in handlers {
        handler(*agent_id, to);
    }
}

#[cfg(test)]
#[path = "turn_tests.rs"]
mod tests;
