// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relay controller: directive capture, draft flush, safety net.
//!
//! Streamed agent text arrives in chunks. The controller accumulates a
//! per-agent draft, scans each completed line for `[TO:…]`/`[TASK:…]`
//! directives, converts them to bus actions, and forwards everything
//! else to the renderer after a short debounce so partial chunks are
//! never shown twice. When the lead finishes a turn that was triggered
//! by a worker reply without tagging anyone, the safety net relays the
//! whole reply back to that worker after half a second of silence.
//!
//! The controller is tick-driven: the orchestrator calls [`RelayController::on_tick`]
//! on its loop and all deadlines are measured on the core [`Clock`], so
//! tests drive time explicitly.

use crate::bus::MessageBus;
use crate::limits::RelayRateLimiter;
use crate::task_board::{TaskBoard, TaskItem};
use fedi_core::directive::{is_directive_line, parse_directives, DirectiveKind};
use fedi_core::{
    AgentId, AgentStatus, Clock, CorrelationId, Message, MessageDraft, OutputKind, OutputLine,
    Recipient, Sender,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Renderer-facing sink for cleaned output and controller notices.
pub type ControllerOutput = Arc<dyn Fn(AgentId, &OutputLine) + Send + Sync>;

/// Task board change notification.
pub type TaskUpdateFn = Arc<dyn Fn(&[TaskItem]) + Send + Sync>;

/// Tunables, defaulted from the spec'd constants.
#[derive(Debug, Clone)]
pub struct RelayControllerConfig {
    /// Debounce before the non-directive draft is flushed as output.
    pub draft_flush: Duration,
    /// Silence before an orphaned lead reply is force-relayed.
    pub safety_net_debounce: Duration,
    pub max_relays_per_window: usize,
    pub relay_window: Duration,
    /// Ceiling on worker↔worker relays per round (reset on user input).
    pub max_cross_talk_per_round: usize,
}

impl Default for RelayControllerConfig {
    fn default() -> Self {
        Self {
            draft_flush: Duration::from_millis(150),
            safety_net_debounce: Duration::from_millis(500),
            max_relays_per_window: 50,
            relay_window: Duration::from_millis(60_000),
            max_cross_talk_per_round: 20,
        }
    }
}

/// What triggered an agent's current turn.
#[derive(Debug, Clone)]
struct TurnTrigger {
    from: Sender,
    correlation_id: Option<CorrelationId>,
}

/// An empty-content `[TO:X]` waiting for its content lines.
#[derive(Debug)]
struct PendingRelay {
    target: AgentId,
    lines: Vec<String>,
}

/// A scheduled safety-net auto-relay.
#[derive(Debug)]
struct SafetyNet {
    target: AgentId,
    correlation_id: Option<CorrelationId>,
    text: String,
    fire_at: Instant,
}

#[derive(Default)]
struct AgentDraft {
    /// Unscanned text; at most one trailing partial line.
    scan_buf: String,
    /// Cleaned lines awaiting the debounce flush.
    out_buf: Vec<String>,
    /// All cleaned text this turn; the safety-net payload.
    turn_text: String,
    pending_relay: Option<PendingRelay>,
    directives_this_turn: u32,
    trigger: Option<TurnTrigger>,
    flush_at: Option<Instant>,
    safety: Option<SafetyNet>,
}

struct ControllerState<C: Clock> {
    drafts: HashMap<AgentId, AgentDraft>,
    limiter: RelayRateLimiter<C>,
    board: TaskBoard,
    cross_talk: usize,
}

/// Bridges driver output streams to the bus.
pub struct RelayController<C: Clock> {
    bus: Arc<MessageBus<C>>,
    clock: C,
    config: RelayControllerConfig,
    state: Mutex<ControllerState<C>>,
    output: ControllerOutput,
    task_update: Option<TaskUpdateFn>,
}

impl<C: Clock> RelayController<C> {
    pub fn new(
        bus: Arc<MessageBus<C>>,
        clock: C,
        config: RelayControllerConfig,
        output: ControllerOutput,
        task_update: Option<TaskUpdateFn>,
    ) -> Self {
        let limiter = RelayRateLimiter::new(
            config.max_relays_per_window,
            config.relay_window,
            clock.clone(),
        );
        Self {
            bus,
            clock,
            config,
            state: Mutex::new(ControllerState {
                drafts: HashMap::new(),
                limiter,
                board: TaskBoard::new(),
                cross_talk: 0,
            }),
            output,
            task_update,
        }
    }

    /// Note a prompt delivery: records the turn trigger for the target
    /// and cancels any pending safety net (a fresher message wins).
    pub fn note_delivery(&self, agent: AgentId, message: &Message) {
        let mut state = self.state.lock();
        let draft = state.drafts.entry(agent).or_default();
        draft.trigger = Some(TurnTrigger {
            from: message.from,
            correlation_id: message.correlation_id.clone(),
        });
        draft.safety = None;
    }

    /// New user input starts a fresh round for the cross-talk ceiling.
    pub fn reset_round(&self) {
        self.state.lock().cross_talk = 0;
    }

    /// Current task board contents.
    pub fn tasks(&self) -> Vec<TaskItem> {
        self.state.lock().board.snapshot()
    }

    /// Feed one driver output line through the controller.
    pub fn on_output(&self, agent: AgentId, line: &OutputLine) {
        if line.kind != OutputKind::Stdout {
            // Action indicators and notices bypass the draft entirely.
            (self.output)(agent, line);
            return;
        }
        let mut state = self.state.lock();
        self.ingest_text(&mut state, agent, &line.text);
    }

    /// Track driver status transitions for turn bookkeeping.
    pub fn on_status(&self, agent: AgentId, status: AgentStatus) {
        let mut state = self.state.lock();
        match status {
            AgentStatus::Running => {
                let draft = state.drafts.entry(agent).or_default();
                draft.directives_this_turn = 0;
                draft.turn_text.clear();
                draft.safety = None;
            }
            AgentStatus::Waiting => self.end_turn(&mut state, agent),
            AgentStatus::Error | AgentStatus::Stopped | AgentStatus::Idle => {
                // Abandon the draft; nothing trustworthy to relay.
                let draft = state.drafts.entry(agent).or_default();
                draft.pending_relay = None;
                draft.safety = None;
                draft.scan_buf.clear();
                self.flush(&mut state, agent);
            }
        }
    }

    /// Advance time-based work: due draft flushes and safety-net fires.
    pub fn on_tick(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let due_flush: Vec<AgentId> = state
            .drafts
            .iter()
            .filter(|(_, d)| d.flush_at.is_some_and(|at| at <= now))
            .map(|(a, _)| *a)
            .collect();
        for agent in due_flush {
            self.flush(&mut state, agent);
        }

        let due_safety: Vec<AgentId> = state
            .drafts
            .iter()
            .filter(|(_, d)| d.safety.as_ref().is_some_and(|s| s.fire_at <= now))
            .map(|(a, _)| *a)
            .collect();
        for agent in due_safety {
            let Some(safety) = state
                .drafts
                .get_mut(&agent)
                .and_then(|d| d.safety.take())
            else {
                continue;
            };
            tracing::info!(
                from = %agent,
                to = %safety.target,
                "safety net: relaying untagged reply"
            );
            self.fire_relay(
                &mut state,
                agent,
                safety.target,
                safety.text,
                safety.correlation_id,
            );
        }
    }

    /// Append streamed text to the draft and scan completed lines.
    ///
    /// A trailing partial chunk stays buffered so a directive split
    /// across chunks can reassemble; the debounce flush picks it up if
    /// no continuation arrives.
    fn ingest_text(&self, state: &mut ControllerState<C>, agent: AgentId, text: &str) {
        {
            let now = self.clock.now();
            let draft = state.drafts.entry(agent).or_default();
            draft.scan_buf.push_str(text);
            draft.flush_at = Some(now + self.config.draft_flush);
        }

        loop {
            let line = {
                let draft = state.drafts.entry(agent).or_default();
                match draft.scan_buf.find('\n') {
                    Some(newline) => {
                        let line: String = draft.scan_buf.drain(..=newline).collect();
                        line.trim_end_matches('\n').to_string()
                    }
                    None => break,
                }
            };
            self.handle_line(state, agent, &line);
        }
    }

    /// Route one complete line: relay content, directive, or prose.
    fn handle_line(&self, state: &mut ControllerState<C>, agent: AgentId, line: &str) {
        let has_pending = state
            .drafts
            .get(&agent)
            .is_some_and(|d| d.pending_relay.is_some());

        if has_pending {
            let blank = line.trim().is_empty();
            if blank || is_directive_line(line) {
                self.fire_pending(state, agent);
                if blank {
                    return;
                }
            } else {
                if let Some(pending) = state
                    .drafts
                    .entry(agent)
                    .or_default()
                    .pending_relay
                    .as_mut()
                {
                    pending.lines.push(line.trim().to_string());
                }
                return;
            }
        }

        if !is_directive_line(line) {
            let now = self.clock.now();
            let draft = state.drafts.entry(agent).or_default();
            draft.out_buf.push(line.to_string());
            draft.turn_text.push_str(line);
            draft.turn_text.push('\n');
            draft.flush_at = Some(now + self.config.draft_flush);
            return;
        }

        let outcome = parse_directives(line);
        for token in outcome.tokens {
            match token.kind {
                DirectiveKind::Relay { target, content } => {
                    let correlation = {
                        let draft = state.drafts.entry(agent).or_default();
                        draft.directives_this_turn += 1;
                        draft.safety = None;
                        draft.trigger.as_ref().and_then(|t| t.correlation_id.clone())
                    };
                    if content.is_empty() {
                        state.drafts.entry(agent).or_default().pending_relay =
                            Some(PendingRelay {
                                target,
                                lines: Vec::new(),
                            });
                    } else {
                        self.fire_relay(state, agent, target, content, correlation);
                    }
                }
                DirectiveKind::TaskAdd { text } => {
                    if state.board.add(&text) {
                        self.notify_tasks(state);
                    }
                }
                DirectiveKind::TaskDone { text } => {
                    if state.board.complete(&text) {
                        self.notify_tasks(state);
                    }
                }
            }
        }
    }

    /// Fire a pending empty-content relay with its attached lines.
    fn fire_pending(&self, state: &mut ControllerState<C>, agent: AgentId) {
        let Some(pending) = state
            .drafts
            .get_mut(&agent)
            .and_then(|d| d.pending_relay.take())
        else {
            return;
        };
        let content = pending.lines.join("\n");
        let correlation = state
            .drafts
            .get(&agent)
            .and_then(|d| d.trigger.as_ref())
            .and_then(|t| t.correlation_id.clone());
        self.fire_relay(state, agent, pending.target, content, correlation);
    }

    /// Route one relay through the ceilings and the bus.
    fn fire_relay(
        &self,
        state: &mut ControllerState<C>,
        from: AgentId,
        target: AgentId,
        content: String,
        correlation_id: Option<CorrelationId>,
    ) {
        if content.trim().is_empty() {
            tracing::debug!(%from, %target, "dropping empty relay");
            return;
        }

        let cross_talk = !from.is_lead() && !target.is_lead();
        if cross_talk && state.cross_talk >= self.config.max_cross_talk_per_round {
            tracing::warn!(%from, %target, "cross-talk ceiling reached");
            (self.output)(
                from,
                &OutputLine::info("plafond d'échanges atteint / cross-talk ceiling reached"),
            );
            return;
        }

        if !state.limiter.allow() {
            tracing::warn!(%from, %target, "relay rate limited");
            (self.output)(
                from,
                &OutputLine::info("relais limité / relay rate-limited, dropped"),
            );
            return;
        }

        if cross_talk {
            state.cross_talk += 1;
        }
        self.bus
            .relay(from, Recipient::Agent(target), content, correlation_id);
    }

    /// End-of-turn bookkeeping on `→ waiting`.
    fn end_turn(&self, state: &mut ControllerState<C>, agent: AgentId) {
        self.flush(state, agent);
        self.fire_pending(state, agent);

        let draft = state.drafts.entry(agent).or_default();
        let untagged = draft.directives_this_turn == 0;
        let trigger_worker = draft
            .trigger
            .as_ref()
            .and_then(|t| t.from.agent())
            .filter(|a| !a.is_lead());
        let text = draft.turn_text.trim().to_string();

        let mut armed = false;
        if agent.is_lead() && untagged {
            if let Some(worker) = trigger_worker {
                if !text.is_empty() {
                    draft.safety = Some(SafetyNet {
                        target: worker,
                        correlation_id: draft
                            .trigger
                            .as_ref()
                            .and_then(|t| t.correlation_id.clone()),
                        text: text.clone(),
                        fire_at: self.clock.now() + self.config.safety_net_debounce,
                    });
                    armed = true;
                }
            }
        }

        // Mirror the turn's prose into the session record. The safety
        // net appends its own relay message, so skip when it is armed.
        if !armed && !text.is_empty() {
            self.bus
                .record(MessageDraft::new(agent, Recipient::All, text));
        }
    }

    /// Drain the draft: scan any trailing partial line, then emit the
    /// buffered cleaned lines to the renderer sink.
    fn flush(&self, state: &mut ControllerState<C>, agent: AgentId) {
        let leftover = {
            let Some(draft) = state.drafts.get_mut(&agent) else {
                return;
            };
            draft.flush_at = None;
            std::mem::take(&mut draft.scan_buf)
        };
        let leftover = leftover.trim_end_matches('\n');
        if !leftover.is_empty() {
            let leftover = leftover.to_string();
            self.handle_line(state, agent, &leftover);
        }

        let lines = {
            let Some(draft) = state.drafts.get_mut(&agent) else {
                return;
            };
            draft.flush_at = None;
            std::mem::take(&mut draft.out_buf)
        };
        for line in lines {
            (self.output)(agent, &OutputLine::stdout(line));
        }
    }

    fn notify_tasks(&self, state: &ControllerState<C>) {
        if let Some(notify) = &self.task_update {
            notify(&state.board.snapshot());
        }
    }
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
