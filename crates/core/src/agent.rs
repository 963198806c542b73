// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent identifiers, message endpoints, and the driver status machine.
//!
//! The set of agents is closed and known at process start: one lead and a
//! fixed pool of workers. `AgentId` is deliberately an enum, not a string,
//! so routing typos fail at compile time rather than at the bus boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of one agent in the orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    /// The supervising agent; receives the user task and issues relays.
    Lead,
    WorkerA,
    WorkerB,
}

impl AgentId {
    /// Every agent in the closed set, lead first.
    pub fn all() -> &'static [AgentId] {
        &[AgentId::Lead, AgentId::WorkerA, AgentId::WorkerB]
    }

    /// The stable wire/display label (`"lead"`, `"worker_a"`, `"worker_b"`).
    pub fn label(&self) -> &'static str {
        match self {
            AgentId::Lead => "lead",
            AgentId::WorkerA => "worker_a",
            AgentId::WorkerB => "worker_b",
        }
    }

    /// The uppercase directive label used inside `[TO:…]` tags.
    pub fn directive_label(&self) -> &'static str {
        match self {
            AgentId::Lead => "LEAD",
            AgentId::WorkerA => "WORKER_A",
            AgentId::WorkerB => "WORKER_B",
        }
    }

    /// Resolve a directive label (`LEAD`, `WORKER_A`, …). Exact casing only.
    pub fn from_directive_label(label: &str) -> Option<AgentId> {
        AgentId::all()
            .iter()
            .copied()
            .find(|a| a.directive_label() == label)
    }

    pub fn is_lead(&self) -> bool {
        matches!(self, AgentId::Lead)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for AgentId {
    type Err = UnknownAgent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentId::all()
            .iter()
            .copied()
            .find(|a| a.label() == s)
            .ok_or_else(|| UnknownAgent(s.to_string()))
    }
}

/// Error for unresolvable agent labels.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown agent: {0}")]
pub struct UnknownAgent(pub String);

/// Origin of a bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Agent(AgentId),
    User,
    System,
}

impl Sender {
    /// The agent behind this sender, if any.
    pub fn agent(&self) -> Option<AgentId> {
        match self {
            Sender::Agent(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::Agent(id) => write!(f, "{}", id),
            Sender::User => write!(f, "user"),
            Sender::System => write!(f, "system"),
        }
    }
}

impl From<AgentId> for Sender {
    fn from(id: AgentId) -> Self {
        Sender::Agent(id)
    }
}

/// Destination of a bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    Agent(AgentId),
    All,
}

impl Recipient {
    /// The single agent behind this recipient, if not a broadcast.
    pub fn agent(&self) -> Option<AgentId> {
        match self {
            Recipient::Agent(id) => Some(*id),
            Recipient::All => None,
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Agent(id) => write!(f, "{}", id),
            Recipient::All => write!(f, "all"),
        }
    }
}

impl From<AgentId> for Recipient {
    fn from(id: AgentId) -> Self {
        Recipient::Agent(id)
    }
}

/// Driver-owned lifecycle state of one agent.
///
/// Only the driver transitions its own status; everyone else observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// No turn accepted yet, or recovered after a timeout
    Idle,
    /// A prompt is in flight
    Running,
    /// Last turn produced its terminal event; process context alive
    Waiting,
    /// Recoverable failure; next prompt retries
    Error,
    /// Explicitly stopped or process exited
    Stopped,
}

impl AgentStatus {
    /// Whether `from → to` is a legal edge of the status machine.
    ///
    /// `Error` and `Stopped` are reachable from anywhere; `Stopped`
    /// leaves only through an explicit restart (`Stopped → Idle`).
    pub fn can_transition(from: AgentStatus, to: AgentStatus) -> bool {
        use AgentStatus::*;
        if from == to {
            return true;
        }
        match (from, to) {
            (_, Error) | (_, Stopped) => true,
            (Idle, Running) | (Waiting, Running) | (Error, Running) => true,
            (Running, Waiting) => true,
            (Error, Idle) => true,
            (Stopped, Idle) => true,
            _ => false,
        }
    }

    /// Whether a new prompt may be dispatched immediately in this state.
    pub fn accepts_prompt(&self) -> bool {
        matches!(self, AgentStatus::Idle | AgentStatus::Waiting | AgentStatus::Error)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Running => write!(f, "running"),
            AgentStatus::Waiting => write!(f, "waiting"),
            AgentStatus::Error => write!(f, "error"),
            AgentStatus::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
