//! Relay routing: simple relay, depth cutoff, embedded mentions.

use crate::prelude::*;
use fedi_core::{AgentId, CorrelationId, OutputKind, Recipient};
use fedi_engine::{BlockReason, MAX_RELAY_DEPTH};

#[tokio::test]
async fn simple_relay_reaches_worker() {
    let rig = rig();
    rig.orchestrator.start_with_task("Build X");
    settle().await;

    rig.lead.emit_stdout("[TO:WORKER_A] implement Y\n");
    settle().await;

    // One bus message lead→worker_a, first hop of a fresh chain
    let history = rig.orchestrator.bus().history();
    let relay = history.last().unwrap();
    assert_eq!(relay.to, Recipient::Agent(AgentId::WorkerA));
    assert_eq!(relay.content, "implement Y");
    assert_eq!(relay.relay_count, 1);
    assert!(relay.correlation_id.is_some());

    // The worker's driver got it as a prompt, behind the context summary
    let sent = rig.worker_a.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].ends_with("[from lead] implement Y"), "prompt: {}", sent[0]);
}

#[tokio::test]
async fn depth_cutoff_blocks_sixth_hop() {
    let rig = rig();
    rig.orchestrator.start_with_task("ping-pong");
    settle().await;

    let bus = rig.orchestrator.bus();
    let chain = CorrelationId::from("K");
    let hops = [
        (AgentId::Lead, AgentId::WorkerA),
        (AgentId::WorkerA, AgentId::Lead),
    ];
    for n in 0..MAX_RELAY_DEPTH as usize {
        let (from, to) = hops[n % 2];
        assert!(bus.relay(from, Recipient::Agent(to), format!("hop {n}"), Some(chain.clone())));
    }
    assert!(!bus.relay(
        AgentId::WorkerA,
        Recipient::Agent(AgentId::Lead),
        "one too many",
        Some(chain.clone()),
    ));
    settle().await;

    let in_chain = bus
        .history()
        .iter()
        .filter(|m| m.correlation_id.as_ref() == Some(&chain))
        .count();
    assert_eq!(in_chain, MAX_RELAY_DEPTH as usize);

    let blocked = rig.blocked.lock();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].relay_count, MAX_RELAY_DEPTH);
    assert_eq!(blocked[0].reason, BlockReason::DepthExceeded);

    // The source agent was told why
    let outputs = rig.outputs.lock();
    assert!(outputs.iter().any(|(agent, line)| *agent == AgentId::WorkerA
        && line.kind == OutputKind::Info
        && line.text.contains("depth exceeded")));
}

#[tokio::test]
async fn embedded_mention_is_not_a_relay() {
    let rig = rig();
    rig.orchestrator.start_with_task("Build X");
    settle().await;

    rig.lead
        .emit_stdout("Use the [TO:WORKER_A] pattern to escalate.\n");
    settle_flush().await;

    // No relay fired; the worker never heard about it
    assert_eq!(rig.orchestrator.bus().history().len(), 1);
    assert!(rig.worker_a.sent().is_empty());

    // The sentence reached the renderer untouched
    let outputs = rig.outputs.lock();
    assert!(outputs.iter().any(|(agent, line)| *agent == AgentId::Lead
        && line.kind == OutputKind::Stdout
        && line.text == "Use the [TO:WORKER_A] pattern to escalate."));
}

#[tokio::test]
async fn user_aside_with_worker_stays_out_of_lead_context() {
    let rig = rig();
    rig.orchestrator.start_with_task("Build X");
    settle().await;

    rig.orchestrator
        .send_user_input("@worker_b try the build")
        .unwrap();
    settle().await;
    let sent = rig.worker_b.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].ends_with("try the build"));

    // The next lead prompt carries no record of the aside
    rig.orchestrator.send_user_input("how is it going?").unwrap();
    settle().await;
    let sent = rig.lead.sent();
    let last = sent.last().unwrap();
    assert!(!last.contains("try the build"), "prompt leaked: {last}");
}
