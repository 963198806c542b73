//! Session persistence: round-trip, listing, resume handshake.

use crate::prelude::*;
use fedi_adapters::{AgentDriver, FakeDriver};
use fedi_core::{AgentId, SessionId, UserConfig};
use fedi_engine::{Orchestrator, OrchestratorConfig, RendererHooks};
use std::sync::Arc;

#[tokio::test]
async fn finalized_session_round_trips_from_disk() {
    let rig = rig();
    let id = rig.orchestrator.start_with_task("Build X");
    settle().await;

    rig.lead.emit_stdout("[TO:WORKER_A] implement Y\n");
    settle().await;
    rig.orchestrator.send_user_input("looks good").unwrap();
    settle().await;

    rig.lead.resume_session("ext-lead-1".to_string());
    rig.lead.complete_turn();
    settle().await;

    rig.orchestrator.stop().await.unwrap();

    let loaded = fedi_storage::load_session(rig.dir.path(), &id)
        .unwrap()
        .unwrap();
    assert_eq!(loaded, rig.orchestrator.session().unwrap());
    assert_eq!(loaded.task, "Build X");
    assert_eq!(loaded.messages.len(), 3);
    assert!(loaded.finished_at.is_some());
    assert_eq!(
        loaded.agent_sessions.get(&AgentId::Lead).map(String::as_str),
        Some("ext-lead-1")
    );

    let listed = fedi_storage::list_sessions(rig.dir.path());
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
}

#[tokio::test]
async fn resume_restores_external_sessions_and_replays_context() {
    let rig = rig();
    let id = rig.orchestrator.start_with_task("refactor the bus");
    settle().await;
    rig.lead.resume_session("ext-lead-42".to_string());
    rig.lead.complete_turn();
    settle().await;
    rig.orchestrator.stop().await.unwrap();

    // A new process over the same project directory
    let lead = FakeDriver::new(AgentId::Lead);
    let orchestrator = Orchestrator::new(
        vec![
            Arc::new(lead.clone()) as Arc<dyn AgentDriver>,
            Arc::new(FakeDriver::new(AgentId::WorkerA)),
            Arc::new(FakeDriver::new(AgentId::WorkerB)),
        ],
        OrchestratorConfig {
            user: UserConfig::default(),
            project_dir: rig.dir.path().to_path_buf(),
        },
        RendererHooks::default(),
    );
    let runner = orchestrator.clone();
    tokio::spawn(async move { runner.run().await });

    orchestrator.resume(&id).unwrap();
    // The driver will pass --resume on its next spawn
    assert_eq!(lead.external_session_id().as_deref(), Some("ext-lead-42"));

    orchestrator.send_user_input("continue where we left off").unwrap();
    settle().await;

    let sent = lead.sent();
    let prompt = sent.last().unwrap();
    assert!(prompt.contains("SESSION RESUME"), "prompt: {prompt}");
    assert!(prompt.contains("refactor the bus"));
    assert!(prompt.ends_with("continue where we left off"));
}

#[tokio::test]
async fn resume_of_missing_session_is_an_error() {
    let rig = rig();
    let err = rig.orchestrator.resume(&SessionId::new("no-such-session"));
    assert!(err.is_err());
}
