//! Shared test rig: an orchestrator over fake drivers.

use fedi_adapters::{AgentDriver, FakeDriver};
use fedi_core::{AgentId, OutputLine, UserConfig};
use fedi_engine::{BlockedRelay, Orchestrator, OrchestratorConfig, RendererHooks};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub struct Rig {
    pub orchestrator: Orchestrator,
    pub lead: FakeDriver,
    pub worker_a: FakeDriver,
    pub worker_b: FakeDriver,
    pub outputs: Arc<Mutex<Vec<(AgentId, OutputLine)>>>,
    pub blocked: Arc<Mutex<Vec<BlockedRelay>>>,
    pub dir: TempDir,
}

pub fn rig() -> Rig {
    let dir = TempDir::new().unwrap();
    let lead = FakeDriver::new(AgentId::Lead);
    let worker_a = FakeDriver::new(AgentId::WorkerA);
    let worker_b = FakeDriver::new(AgentId::WorkerB);

    let outputs: Arc<Mutex<Vec<(AgentId, OutputLine)>>> = Default::default();
    let blocked: Arc<Mutex<Vec<BlockedRelay>>> = Default::default();

    let outputs_clone = Arc::clone(&outputs);
    let blocked_clone = Arc::clone(&blocked);
    let hooks = RendererHooks {
        on_agent_output: Arc::new(move |agent, line| {
            outputs_clone.lock().push((agent, line.clone()));
        }),
        on_relay_blocked: Arc::new(move |b| {
            blocked_clone.lock().push(b.clone());
        }),
        ..RendererHooks::default()
    };

    let mut user = UserConfig::default();
    user.checkpoint_throttle_ms = Some(10);
    let orchestrator = Orchestrator::new(
        vec![
            Arc::new(lead.clone()) as Arc<dyn AgentDriver>,
            Arc::new(worker_a.clone()),
            Arc::new(worker_b.clone()),
        ],
        OrchestratorConfig {
            user,
            project_dir: dir.path().to_path_buf(),
        },
        hooks,
    );

    let runner = orchestrator.clone();
    tokio::spawn(async move { runner.run().await });

    Rig {
        orchestrator,
        lead,
        worker_a,
        worker_b,
        outputs,
        blocked,
        dir,
    }
}

impl Rig {
    /// Run the lead through one full turn that emits `text`.
    pub async fn lead_turn(&self, text: &str) {
        self.lead.emit_stdout(text);
        settle().await;
        self.lead.complete_turn();
        settle().await;
    }
}

/// Let the orchestration loop drain its channel.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(40)).await;
}

/// Wait past the draft-flush debounce.
pub async fn settle_flush() {
    tokio::time::sleep(Duration::from_millis(280)).await;
}

/// Wait past the safety-net debounce.
pub async fn settle_safety_net() {
    tokio::time::sleep(Duration::from_millis(700)).await;
}
