// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fedi_core::{Message, MessageId, Recipient, Sender, SessionId};

fn message(n: u32) -> Message {
    Message {
        id: MessageId::new(format!("m-{n}")),
        from: Sender::User,
        to: Recipient::Agent(AgentId::Lead),
        content: format!("message {n}"),
        correlation_id: None,
        relay_count: 0,
        timestamp: Utc::now(),
    }
}

#[test]
fn new_session_has_current_version() {
    let session = SessionData::new(SessionId::new("s-1"), "build X", "/tmp/project".into());
    assert_eq!(session.version, SESSION_VERSION);
    assert_eq!(session.task, "build X");
    assert!(session.finished_at.is_none());
    assert!(session.messages.is_empty());
    assert!(session.agent_sessions.is_empty());
}

#[test]
fn last_messages_returns_tail() {
    let mut session = SessionData::new(SessionId::new("s-1"), "t", "/tmp".into());
    for n in 0..8 {
        session.messages.push(message(n));
    }
    let tail = session.last_messages(5);
    assert_eq!(tail.len(), 5);
    assert_eq!(tail[0].content, "message 3");
    assert_eq!(tail[4].content, "message 7");

    // Asking for more than exist returns all
    assert_eq!(session.last_messages(100).len(), 8);
}

#[test]
fn serde_round_trip_preserves_agent_sessions() {
    let mut session = SessionData::new(SessionId::new("s-2"), "t", "/tmp".into());
    session
        .agent_sessions
        .insert(AgentId::Lead, "ext-lead-1".to_string());
    session
        .agent_sessions
        .insert(AgentId::WorkerA, "ext-wa-1".to_string());
    session.messages.push(message(1));

    let json = serde_json::to_string_pretty(&session).unwrap();
    let back: SessionData = serde_json::from_str(&json).unwrap();
    assert_eq!(back, session);
    assert_eq!(
        back.agent_sessions.get(&AgentId::Lead).map(String::as_str),
        Some("ext-lead-1")
    );
}
