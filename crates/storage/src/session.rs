// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent session record types.

use chrono::{DateTime, Utc};
use fedi_core::{AgentId, Message, SessionId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Current on-disk schema version. Loaders reject any other value.
pub const SESSION_VERSION: u32 = 2;

/// One durable orchestration session.
///
/// The message list is the authoritative conversation record; the
/// in-memory bus history is merely a working buffer. `agent_sessions`
/// maps each agent to the external session id its CLI handed back, so a
/// resumed run can pass `--resume` on the next spawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub id: SessionId,
    pub version: u32,
    pub task: String,
    pub project_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub agent_sessions: IndexMap<AgentId, String>,
}

impl SessionData {
    /// Start a fresh session for `task` rooted at `project_dir`.
    pub fn new(id: SessionId, task: impl Into<String>, project_dir: PathBuf) -> Self {
        Self {
            id,
            version: SESSION_VERSION,
            task: task.into(),
            project_dir,
            started_at: Utc::now(),
            finished_at: None,
            messages: Vec::new(),
            agent_sessions: IndexMap::new(),
        }
    }

    /// The trailing `n` messages, oldest first.
    pub fn last_messages(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }
}

/// Listing entry for a stored session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub task: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
