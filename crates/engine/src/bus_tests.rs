// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fedi_core::FakeClock;
use std::sync::Arc;

fn bus() -> MessageBus<FakeClock> {
    MessageBus::with_clock(200, FakeClock::new())
}

/// Collects every event the bus emits.
fn recording(bus: &MessageBus<FakeClock>) -> Arc<Mutex<Vec<BusEvent>>> {
    let events: Arc<Mutex<Vec<BusEvent>>> = Default::default();
    let events_clone = Arc::clone(&events);
    bus.subscribe(Arc::new(move |event| {
        events_clone.lock().push(event.clone());
    }));
    events
}

#[test]
fn send_assigns_id_and_routes_to_target() {
    let bus = bus();
    let events = recording(&bus);

    let message = bus.send(MessageDraft::new(Sender::User, AgentId::Lead, "Build X"));
    assert!(!message.id.as_str().is_empty());
    assert_eq!(message.relay_count, 0);

    let events = events.lock();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], BusEvent::Message(m) if m.id == message.id));
    assert!(
        matches!(&events[1], BusEvent::Delivery { agent, message: m } if *agent == AgentId::Lead && m.id == message.id)
    );
}

#[test]
fn record_does_not_route() {
    let bus = bus();
    let events = recording(&bus);

    bus.record(MessageDraft::new(Sender::System, AgentId::Lead, "note"));

    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], BusEvent::Message(_)));
}

#[test]
fn relay_increments_count_and_emits_relay_event() {
    let bus = bus();
    let events = recording(&bus);

    assert!(bus.relay(
        AgentId::Lead,
        Recipient::Agent(AgentId::WorkerA),
        "implement Y",
        None,
    ));

    let history = bus.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].relay_count, 1);
    assert!(history[0].correlation_id.is_some());

    let events = events.lock();
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            BusEvent::Message(_) => "message",
            BusEvent::Delivery { .. } => "delivery",
            BusEvent::Relay(_) => "relay",
            BusEvent::RelayBlocked(_) => "blocked",
        })
        .collect();
    assert_eq!(kinds, vec!["message", "delivery", "relay"]);
}

#[test]
fn sixth_relay_on_chain_is_blocked() {
    let bus = bus();
    let events = recording(&bus);
    let chain = CorrelationId::from("K");

    let endpoints = [
        (AgentId::Lead, AgentId::WorkerA),
        (AgentId::WorkerA, AgentId::Lead),
    ];
    for n in 0..5 {
        let (from, to) = endpoints[n % 2];
        assert!(bus.relay(from, Recipient::Agent(to), format!("hop {n}"), Some(chain.clone())));
    }

    // Sixth attempt refuses
    assert!(!bus.relay(
        AgentId::WorkerA,
        Recipient::Agent(AgentId::Lead),
        "hop 5",
        Some(chain.clone()),
    ));

    let in_chain = bus
        .history()
        .iter()
        .filter(|m| m.correlation_id.as_ref() == Some(&chain))
        .count();
    assert_eq!(in_chain, 5);

    let events = events.lock();
    let blocked: Vec<&BlockedRelay> = events
        .iter()
        .filter_map(|e| match e {
            BusEvent::RelayBlocked(b) => Some(b),
            _ => None,
        })
        .collect();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].relay_count, 5);
    assert_eq!(blocked[0].reason, BlockReason::DepthExceeded);
}

#[test]
fn history_is_capped_fifo() {
    let bus = bus();
    for n in 0..520 {
        bus.record(MessageDraft::new(Sender::System, AgentId::Lead, format!("m{n}")));
    }
    let history = bus.history();
    assert_eq!(history.len(), HISTORY_CAP);
    assert_eq!(history[0].content, "m20");
    assert_eq!(history.last().map(|m| m.content.as_str()), Some("m519"));
    assert_eq!(bus.history_cursor(), 520);
}

#[test]
fn broadcast_delivers_to_everyone_but_sender() {
    let bus = bus();
    let events = recording(&bus);

    bus.send(MessageDraft::new(AgentId::Lead, Recipient::All, "status?"));

    let events = events.lock();
    let delivered: Vec<AgentId> = events
        .iter()
        .filter_map(|e| match e {
            BusEvent::Delivery { agent, .. } => Some(*agent),
            _ => None,
        })
        .collect();
    assert_eq!(delivered, vec![AgentId::WorkerA, AgentId::WorkerB]);
}

#[test]
fn broadcast_relay_counts_once_per_destination() {
    let bus = bus();
    let chain = CorrelationId::from("B");

    assert!(bus.relay(AgentId::Lead, Recipient::All, "fan out", Some(chain.clone())));
    // Two destinations counted; depth 5 leaves room for three more hops
    assert!(bus.relay(
        AgentId::WorkerA,
        Recipient::Agent(AgentId::Lead),
        "reply 1",
        Some(chain.clone()),
    ));
    assert!(bus.relay(
        AgentId::WorkerB,
        Recipient::Agent(AgentId::Lead),
        "reply 2",
        Some(chain.clone()),
    ));
    assert!(bus.relay(
        AgentId::Lead,
        Recipient::Agent(AgentId::WorkerA),
        "follow-up",
        Some(chain.clone()),
    ));
    assert!(!bus.relay(
        AgentId::WorkerA,
        Recipient::Agent(AgentId::Lead),
        "over",
        Some(chain),
    ));
}

#[test]
fn backpressure_refuses_delivery() {
    let bus = bus();
    let events = recording(&bus);
    bus.set_queue_probe(Arc::new(|agent| {
        if agent == AgentId::WorkerA {
            BACKPRESSURE_DEPTH
        } else {
            0
        }
    }));

    bus.send(MessageDraft::new(AgentId::Lead, AgentId::WorkerA, "busy?"));
    bus.send(MessageDraft::new(AgentId::Lead, AgentId::WorkerB, "free?"));

    let events = events.lock();
    let mut deliveries = 0;
    let mut blocked = 0;
    for event in events.iter() {
        match event {
            BusEvent::Delivery { agent, .. } => {
                deliveries += 1;
                assert_eq!(*agent, AgentId::WorkerB);
            }
            BusEvent::RelayBlocked(b) => {
                blocked += 1;
                assert_eq!(b.reason, BlockReason::Backpressure);
                assert_eq!(b.to, Recipient::Agent(AgentId::WorkerA));
            }
            _ => {}
        }
    }
    assert_eq!((deliveries, blocked), (1, 1));
}

#[test]
fn context_summary_excludes_own_traffic_and_sidebars() {
    let bus = bus();
    bus.send(MessageDraft::new(Sender::User, AgentId::Lead, "task"));
    bus.send(MessageDraft::new(AgentId::Lead, AgentId::WorkerB, "sub-task"));
    bus.send(MessageDraft::new(Sender::User, AgentId::WorkerB, "private aside"));
    bus.send(MessageDraft::new(AgentId::WorkerB, AgentId::Lead, "done"));

    // worker_a saw none of this; the user↔worker_b aside stays private
    let (summary, cursor) = bus.context_summary(AgentId::WorkerA, 0, 5);
    assert_eq!(cursor, 4);
    let lines: Vec<&str> = summary.lines().collect();
    assert_eq!(
        lines,
        vec![
            "[user→lead] task",
            "[lead→worker_b] sub-task",
            "[worker_b→lead] done",
        ]
    );

    // the lead was an endpoint of everything except the aside, which is
    // excluded as a user↔worker sidebar
    let (summary, _) = bus.context_summary(AgentId::Lead, 0, 5);
    assert_eq!(summary, "");
}

#[test]
fn context_summary_honours_cursor_and_max() {
    let bus = bus();
    for n in 0..8 {
        bus.send(MessageDraft::new(AgentId::Lead, AgentId::WorkerB, format!("m{n}")));
    }

    let (summary, cursor) = bus.context_summary(AgentId::WorkerA, 6, 5);
    assert_eq!(summary.lines().count(), 2);
    assert!(summary.contains("m6") && summary.contains("m7"));
    assert_eq!(cursor, 8);

    // max picks the newest entries
    let (summary, _) = bus.context_summary(AgentId::WorkerA, 0, 3);
    let lines: Vec<&str> = summary.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("m5") && lines[2].contains("m7"));
}

#[test]
fn context_summary_truncates_long_content() {
    let bus = bus();
    bus.send(MessageDraft::new(
        AgentId::Lead,
        AgentId::WorkerB,
        "x".repeat(400),
    ));
    let (summary, _) = bus.context_summary(AgentId::WorkerA, 0, 5);
    assert!(summary.chars().count() < 200);
    assert!(summary.ends_with('…'));
}

#[test]
fn reset_clears_state_but_keeps_subscribers() {
    let bus = bus();
    let events = recording(&bus);

    bus.send(MessageDraft::new(Sender::User, AgentId::Lead, "before"));
    bus.reset();
    assert!(bus.history().is_empty());
    assert_eq!(bus.history_cursor(), 0);

    bus.send(MessageDraft::new(Sender::User, AgentId::Lead, "after"));
    let events = events.lock();
    // 2 events for each send: subscriber survived the reset
    assert_eq!(events.len(), 4);
}

#[test]
fn depth_resets_with_bus_reset() {
    let bus = bus();
    let chain = CorrelationId::from("K");
    for _ in 0..5 {
        assert!(bus.relay(
            AgentId::Lead,
            Recipient::Agent(AgentId::WorkerA),
            "hop",
            Some(chain.clone()),
        ));
    }
    assert!(!bus.relay(AgentId::Lead, Recipient::Agent(AgentId::WorkerA), "over", Some(chain.clone())));

    bus.reset();
    assert!(bus.relay(AgentId::Lead, Recipient::Agent(AgentId::WorkerA), "fresh", Some(chain)));
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // History length is monotone under the cap regardless of traffic shape.
        #[test]
        fn history_never_exceeds_cap(sends in 1usize..700) {
            let bus = MessageBus::with_clock(200, FakeClock::new());
            let mut last_len = 0;
            for n in 0..sends {
                bus.record(MessageDraft::new(Sender::System, AgentId::Lead, format!("m{n}")));
                let len = bus.history().len();
                prop_assert!(len >= last_len || len == HISTORY_CAP);
                prop_assert!(len <= HISTORY_CAP);
                last_len = len;
            }
        }
    }
}
