//! Safety-net auto-relay: orphaned lead replies find their way back.

use crate::prelude::*;
use fedi_core::{AgentId, Recipient};

/// Drive the exchange up to the point where the lead owes worker_a an
/// answer: task → lead delegates → worker replies.
async fn delegate_and_reply(rig: &Rig) {
    rig.orchestrator.start_with_task("Build X");
    settle().await;

    rig.lead.emit_stdout("[TO:WORKER_A] implement Y\n");
    settle().await;
    rig.lead.complete_turn();
    settle().await;

    rig.worker_a.emit_stdout("[TO:LEAD] done, tests pass\n");
    settle().await;
    rig.worker_a.complete_turn();
    settle().await;
    assert!(rig
        .lead
        .sent()
        .iter()
        .any(|p| p.ends_with("[from worker_a] done, tests pass")));
}

#[tokio::test]
async fn untagged_lead_reply_is_relayed_back() {
    let rig = rig();
    delegate_and_reply(&rig).await;

    // The lead answers with plain prose, no [TO:…] tag, and goes quiet
    rig.lead_turn("parfait, merge it\n").await;
    settle_safety_net().await;

    let history = rig.orchestrator.bus().history();
    let last = history.last().unwrap();
    assert_eq!(last.to, Recipient::Agent(AgentId::WorkerA));
    assert_eq!(last.content, "parfait, merge it");

    // The worker received it as a prompt
    assert!(rig
        .worker_a
        .sent()
        .iter()
        .any(|p| p.ends_with("[from lead] parfait, merge it")));

    // And it fired exactly once
    settle_safety_net().await;
    let count = rig
        .orchestrator
        .bus()
        .history()
        .iter()
        .filter(|m| m.content == "parfait, merge it")
        .count();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn tagged_lead_reply_disarms_the_net() {
    let rig = rig();
    delegate_and_reply(&rig).await;

    rig.lead_turn("[TO:WORKER_A] run the benchmarks too\n").await;
    settle_safety_net().await;

    let to_worker: Vec<String> = rig
        .orchestrator
        .bus()
        .history()
        .iter()
        .filter(|m| m.to == Recipient::Agent(AgentId::WorkerA))
        .map(|m| m.content.clone())
        .collect();
    // Only the explicit relays, nothing auto-relayed after them
    assert_eq!(to_worker, vec!["implement Y", "run the benchmarks too"]);
}

#[tokio::test]
async fn fresh_worker_message_cancels_pending_net() {
    let rig = rig();
    delegate_and_reply(&rig).await;

    rig.lead_turn("checking the diff\n").await;

    // Before the 500 ms debounce elapses, the worker speaks again
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    rig.worker_a.emit_stdout("[TO:LEAD] also updated the docs\n");
    settle().await;

    settle_safety_net().await;
    let auto_relayed = rig
        .orchestrator
        .bus()
        .history()
        .iter()
        .filter(|m| m.content == "checking the diff")
        .count();
    assert_eq!(auto_relayed, 0);
}
