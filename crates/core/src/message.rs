// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus message and streamed output line types.
//!
//! A `Message` is created by the bus (`send`/`relay`) and never mutated
//! afterwards. An `OutputLine` is one rendered line of a driver's streamed
//! output; the relay controller and renderer both consume them.

use crate::agent::{Recipient, Sender};
use crate::id::{CorrelationId, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One message routed (or recorded) by the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub from: Sender,
    pub to: Recipient,
    pub content: String,
    /// Groups the hops of one relay chain. `None` for originals that have
    /// not (yet) been relayed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    /// 0 for originals, incremented on each relay hop.
    #[serde(default)]
    pub relay_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// Fields a caller supplies; the bus fills in id, count, and timestamp.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub from: Sender,
    pub to: Recipient,
    pub content: String,
    pub correlation_id: Option<CorrelationId>,
    pub relay_count: Option<u32>,
}

impl MessageDraft {
    pub fn new(from: impl Into<Sender>, to: impl Into<Recipient>, content: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            content: content.into(),
            correlation_id: None,
            relay_count: None,
        }
    }

    pub fn with_correlation(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn with_relay_count(mut self, count: u32) -> Self {
        self.relay_count = Some(count);
        self
    }
}

/// Kind of a streamed output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Model-emitted prose
    Stdout,
    /// Raw subprocess stderr surfaced to the debug log
    Stderr,
    /// Action indicator (tool use)
    System,
    /// Meta-notice: errors, timeouts, reconnects
    Info,
    /// Internal relay marker, not shown to the user
    Relay,
}

/// One line of agent output as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub kind: OutputKind,
}

impl OutputLine {
    pub fn new(kind: OutputKind, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn stdout(text: impl Into<String>) -> Self {
        Self::new(OutputKind::Stdout, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(OutputKind::System, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(OutputKind::Info, text)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
