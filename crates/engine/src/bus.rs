// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message bus: routing, correlation depth, history, context summaries.
//!
//! All conversation traffic flows through one bus. `send` routes a
//! message to its target (or every agent for `all`), `record` only logs
//! it, and `relay` continues a correlation chain, refusing once the
//! chain reaches [`MAX_RELAY_DEPTH`]. Subscribers are invoked
//! synchronously in registration order, global event first, targeted
//! deliveries after. Subscribers must not call back into the bus.

use crate::limits::CorrelationTable;
use chrono::Utc;
use fedi_core::{
    AgentId, Clock, CorrelationId, IdGen, Message, MessageDraft, MessageId, Recipient, Sender,
    SystemClock, UuidIdGen,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Hard ceiling on messages per correlation chain.
pub const MAX_RELAY_DEPTH: u32 = 5;

/// In-memory history cap; the session store holds the full record.
pub const HISTORY_CAP: usize = 500;

/// Driver queue depth beyond which targeted sends are refused.
pub const BACKPRESSURE_DEPTH: usize = 16;

/// Longest content slice shown in a context summary line.
const SUMMARY_CONTENT_MAX: usize = 150;

/// Why a relay (or targeted delivery) was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    DepthExceeded,
    Backpressure,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::DepthExceeded => write!(f, "depth exceeded"),
            BlockReason::Backpressure => write!(f, "backpressure"),
        }
    }
}

/// A refused relay, surfaced to the renderer and the source agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedRelay {
    pub from: Sender,
    pub to: Recipient,
    pub content: String,
    pub correlation_id: Option<CorrelationId>,
    /// Chain count at the moment of refusal.
    pub relay_count: u32,
    pub reason: BlockReason,
}

/// Typed bus events, global emission before targeted.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// Every message appended to history.
    Message(Message),
    /// Targeted delivery to one agent's driver.
    Delivery { agent: AgentId, message: Message },
    /// A relay hop that was routed.
    Relay(Message),
    /// A relay or delivery that was refused.
    RelayBlocked(BlockedRelay),
}

/// Subscriber callback. Invoked synchronously; must not re-enter the bus.
pub type BusSubscriber = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// Queue-depth probe per agent, registered by the orchestrator.
pub type QueueProbe = Arc<dyn Fn(AgentId) -> usize + Send + Sync>;

struct BusState {
    history: Vec<Message>,
    /// Messages ever appended; history index of `history[i]` is
    /// `appended - history.len() + i`.
    appended: usize,
    correlations: CorrelationTable,
    subscribers: Vec<BusSubscriber>,
    queue_probe: Option<QueueProbe>,
}

/// The message bus. One per orchestration.
pub struct MessageBus<C: Clock = SystemClock> {
    state: Mutex<BusState>,
    clock: C,
    id_gen: UuidIdGen,
}

impl MessageBus<SystemClock> {
    pub fn new(correlation_cap: usize) -> Self {
        Self::with_clock(correlation_cap, SystemClock)
    }
}

impl<C: Clock> MessageBus<C> {
    pub fn with_clock(correlation_cap: usize, clock: C) -> Self {
        Self {
            state: Mutex::new(BusState {
                history: Vec::new(),
                appended: 0,
                correlations: CorrelationTable::new(correlation_cap),
                subscribers: Vec::new(),
                queue_probe: None,
            }),
            clock,
            id_gen: UuidIdGen,
        }
    }

    /// Register a subscriber. Survives `reset()`.
    pub fn subscribe(&self, subscriber: BusSubscriber) {
        self.state.lock().subscribers.push(subscriber);
    }

    /// Register the per-agent queue-depth probe used for backpressure.
    pub fn set_queue_probe(&self, probe: QueueProbe) {
        self.state.lock().queue_probe = Some(probe);
    }

    /// Route a message: append to history, emit globally, then deliver.
    pub fn send(&self, draft: MessageDraft) -> Message {
        let mut state = self.state.lock();
        let message = self.append(&mut state, draft);
        self.emit(&state, &BusEvent::Message(message.clone()));
        self.deliver(&state, &message);
        message
    }

    /// Append and emit without routing (user-visible injection only).
    pub fn record(&self, draft: MessageDraft) -> Message {
        let mut state = self.state.lock();
        let message = self.append(&mut state, draft);
        self.emit(&state, &BusEvent::Message(message.clone()));
        message
    }

    /// Continue (or open) a relay chain.
    ///
    /// Returns false once the chain already holds [`MAX_RELAY_DEPTH`]
    /// messages, emitting exactly one `RelayBlocked`.
    pub fn relay(
        &self,
        from: AgentId,
        to: Recipient,
        content: impl Into<String>,
        correlation_id: Option<CorrelationId>,
    ) -> bool {
        let content = content.into();
        let mut state = self.state.lock();

        let correlation =
            correlation_id.unwrap_or_else(|| CorrelationId::new(self.id_gen.next()));
        let count = state.correlations.count(&correlation);
        if count >= MAX_RELAY_DEPTH {
            let blocked = BlockedRelay {
                from: Sender::Agent(from),
                to,
                content,
                correlation_id: Some(correlation),
                relay_count: count,
                reason: BlockReason::DepthExceeded,
            };
            tracing::debug!(from = %from, to = %to, count, "relay blocked at depth limit");
            self.emit(&state, &BusEvent::RelayBlocked(blocked));
            return false;
        }

        let draft = MessageDraft::new(from, to, content)
            .with_correlation(correlation)
            .with_relay_count(count + 1);
        let message = self.append(&mut state, draft);
        self.emit(&state, &BusEvent::Message(message.clone()));
        self.deliver(&state, &message);
        self.emit(&state, &BusEvent::Relay(message));
        true
    }

    /// Snapshot of the in-memory history window.
    pub fn history(&self) -> Vec<Message> {
        self.state.lock().history.clone()
    }

    /// Total messages ever appended; the context-summary cursor.
    pub fn history_cursor(&self) -> usize {
        self.state.lock().appended
    }

    /// Compact cross-talk summary for one agent.
    ///
    /// Scans entries newer than `since_index` (an absolute cursor from a
    /// prior call), skipping anything the agent already saw: messages it
    /// sent or received, broadcasts, and user sidebars with other
    /// workers. At most `max` newest entries, rendered oldest-first as
    /// `[from→to] content`. Returns the new cursor.
    pub fn context_summary(
        &self,
        for_agent: AgentId,
        since_index: usize,
        max: usize,
    ) -> (String, usize) {
        let state = self.state.lock();
        let base = state.appended - state.history.len();

        let mut picked: Vec<&Message> = state
            .history
            .iter()
            .enumerate()
            .filter(|(i, _)| base + i >= since_index)
            .map(|(_, m)| m)
            .filter(|m| involves_neither(m, for_agent))
            .collect();
        if picked.len() > max {
            picked.drain(..picked.len() - max);
        }

        let summary = picked
            .iter()
            .map(|m| {
                format!(
                    "[{}→{}] {}",
                    m.from,
                    m.to,
                    truncate(&m.content, SUMMARY_CONTENT_MAX)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        (summary, state.appended)
    }

    /// Clear history and correlation state, keeping subscribers.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.history.clear();
        state.appended = 0;
        state.correlations.clear();
    }

    fn append(&self, state: &mut BusState, draft: MessageDraft) -> Message {
        let message = Message {
            id: MessageId::new(self.id_gen.next()),
            from: draft.from,
            to: draft.to,
            content: draft.content,
            correlation_id: draft.correlation_id.clone(),
            relay_count: draft.relay_count.unwrap_or(0),
            timestamp: Utc::now(),
        };

        if let Some(correlation) = &message.correlation_id {
            // Broadcasts count once per destination they fan out to.
            let destinations = match message.to {
                Recipient::All => broadcast_targets(message.from).len() as u32,
                Recipient::Agent(_) => 1,
            };
            state
                .correlations
                .bump(correlation, destinations, self.clock.now());
        }

        state.history.push(message.clone());
        state.appended += 1;
        if state.history.len() > HISTORY_CAP {
            let excess = state.history.len() - HISTORY_CAP;
            state.history.drain(..excess);
        }
        message
    }

    /// Targeted emission, after the global `Message` event.
    fn deliver(&self, state: &BusState, message: &Message) {
        let targets: Vec<AgentId> = match message.to {
            Recipient::Agent(agent) => vec![agent],
            Recipient::All => broadcast_targets(message.from),
        };

        for agent in targets {
            let backed_up = state
                .queue_probe
                .as_ref()
                .map(|probe| probe(agent) >= BACKPRESSURE_DEPTH)
                .unwrap_or(false);
            if backed_up {
                tracing::warn!(%agent, "delivery refused, driver queue full");
                self.emit(
                    state,
                    &BusEvent::RelayBlocked(BlockedRelay {
                        from: message.from,
                        to: Recipient::Agent(agent),
                        content: message.content.clone(),
                        correlation_id: message.correlation_id.clone(),
                        relay_count: message.relay_count,
                        reason: BlockReason::Backpressure,
                    }),
                );
                continue;
            }
            self.emit(
                state,
                &BusEvent::Delivery {
                    agent,
                    message: message.clone(),
                },
            );
        }
    }

    fn emit(&self, state: &BusState, event: &BusEvent) {
        for subscriber in &state.subscribers {
            subscriber(event);
        }
    }
}

/// Broadcast fan-out: every agent except the sender.
fn broadcast_targets(from: Sender) -> Vec<AgentId> {
    AgentId::all()
        .iter()
        .copied()
        .filter(|a| from.agent() != Some(*a))
        .collect()
}

/// True when the agent was on neither end of the message and it is not a
/// user sidebar with another worker.
fn involves_neither(message: &Message, for_agent: AgentId) -> bool {
    if message.from.agent() == Some(for_agent) {
        return false;
    }
    match message.to {
        Recipient::Agent(to) if to == for_agent => return false,
        // Broadcasts were already delivered to everyone.
        Recipient::All => return false,
        Recipient::Agent(to) => {
            // A user aside with a specific other agent stays private
            // unless it went to the lead.
            if message.from == Sender::User && to != AgentId::Lead {
                return false;
            }
        }
    }
    true
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max - 1).collect();
    format!("{}…", cut)
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
