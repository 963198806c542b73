// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agent::AgentId;

#[test]
fn draft_builder_defaults() {
    let draft = MessageDraft::new(Sender::User, AgentId::Lead, "build X");
    assert_eq!(draft.from, Sender::User);
    assert_eq!(draft.to, Recipient::Agent(AgentId::Lead));
    assert!(draft.correlation_id.is_none());
    assert!(draft.relay_count.is_none());
}

#[test]
fn draft_builder_carries_correlation() {
    let draft = MessageDraft::new(AgentId::Lead, AgentId::WorkerA, "implement Y")
        .with_correlation(CorrelationId::from("chain-1"))
        .with_relay_count(2);
    assert_eq!(draft.correlation_id, Some(CorrelationId::from("chain-1")));
    assert_eq!(draft.relay_count, Some(2));
}

#[test]
fn message_serde_omits_empty_correlation() {
    let msg = Message {
        id: MessageId::new("m-1"),
        from: Sender::User,
        to: Recipient::Agent(AgentId::Lead),
        content: "hello".into(),
        correlation_id: None,
        relay_count: 0,
        timestamp: Utc::now(),
    };
    let json = serde_json::to_value(&msg).unwrap();
    assert!(json.get("correlation_id").is_none());
    assert_eq!(json["relay_count"], 0);

    let back: Message = serde_json::from_value(json).unwrap();
    assert_eq!(back, msg);
}

#[test]
fn output_line_constructors_set_kind() {
    assert_eq!(OutputLine::stdout("x").kind, OutputKind::Stdout);
    assert_eq!(OutputLine::system("x").kind, OutputKind::System);
    assert_eq!(OutputLine::info("x").kind, OutputKind::Info);
}
