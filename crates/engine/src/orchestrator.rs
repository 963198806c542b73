// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator: wires drivers, bus, controller, and session store.
//!
//! One background loop owns all cross-component traffic. Bus
//! subscribers, driver observers, and the relay controller's output sink
//! all enqueue onto a single channel consumed here, so renderer hooks
//! and session writes always happen on the main task in arrival order.

use crate::bus::{BlockedRelay, BusEvent, MessageBus};
use crate::error::OrchestratorError;
use crate::relay::{RelayController, RelayControllerConfig};
use crate::task_board::TaskItem;
use fedi_adapters::AgentDriver;
use fedi_core::{
    AgentId, AgentStatus, Clock, IdGen, Message, MessageDraft, OutputLine, Sender, SessionId,
    SystemClock, UserConfig, UuidIdGen,
};
use fedi_storage::{load_session, SessionStore};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// Controller tick cadence; fine enough for the 150 ms draft debounce.
const CONTROLLER_TICK: Duration = Duration::from_millis(50);

/// Messages replayed into the resume header.
const RESUME_REPLAY: usize = 5;

/// Context summary entries prepended to a delivery.
const CONTEXT_MAX: usize = 5;

/// Default session save debounce when `checkpointThrottleMs` is absent.
const SESSION_THROTTLE: Duration = Duration::from_secs(2);

/// Instructions injected into the lead's first invocation.
const LEAD_SYSTEM_PROMPT: &str = "\
Tu es l'agent principal (lead) d'une équipe d'agents de code. / You are the \
lead agent of a coding agent team.\n\
Delegate sub-tasks by writing a line starting with [TO:WORKER_A] or \
[TO:WORKER_B] followed by the instruction.\n\
Track work with [TASK:add] <text> and [TASK:done] <text> lines.\n\
Directive lines must start at the beginning of the line; they are relayed, \
not shown to the user.";

/// Instructions injected into each worker's first invocation.
const WORKER_SYSTEM_PROMPT: &str = "\
Tu es un agent d'exécution. / You are a worker agent.\n\
Report results back by writing a line starting with [TO:LEAD] followed by \
your reply. Keep replies focused on the delegated sub-task.";

/// Renderer-facing callbacks. Invoked on the orchestrator loop; must not
/// block.
#[derive(Clone)]
pub struct RendererHooks {
    pub on_agent_output: Arc<dyn Fn(AgentId, &OutputLine) + Send + Sync>,
    pub on_agent_status: Arc<dyn Fn(AgentId, AgentStatus) + Send + Sync>,
    pub on_relay: Arc<dyn Fn(&Message) + Send + Sync>,
    pub on_relay_blocked: Arc<dyn Fn(&BlockedRelay) + Send + Sync>,
    pub on_task_update: Arc<dyn Fn(&[TaskItem]) + Send + Sync>,
}

impl Default for RendererHooks {
    fn default() -> Self {
        Self {
            on_agent_output: Arc::new(|_, _| {}),
            on_agent_status: Arc::new(|_, _| {}),
            on_relay: Arc::new(|_| {}),
            on_relay_blocked: Arc::new(|_| {}),
            on_task_update: Arc::new(|_| {}),
        }
    }
}

/// Construction parameters.
pub struct OrchestratorConfig {
    pub user: UserConfig,
    pub project_dir: PathBuf,
}

enum Inbound {
    Bus(BusEvent),
    DriverOutput(AgentId, OutputLine),
    DriverStatus(AgentId, AgentStatus),
    ControllerOutput(AgentId, OutputLine),
    TaskUpdate(Vec<TaskItem>),
}

/// The orchestrator. Clone-cheap; all state lives behind `Arc`.
#[derive(Clone)]
pub struct Orchestrator<C: Clock = SystemClock> {
    inner: Arc<Inner<C>>,
}

struct Inner<C: Clock> {
    bus: Arc<MessageBus<C>>,
    controller: RelayController<C>,
    drivers: HashMap<AgentId, Arc<dyn AgentDriver>>,
    store: SessionStore,
    config: UserConfig,
    hooks: Mutex<RendererHooks>,
    project_dir: PathBuf,
    cursors: Mutex<HashMap<AgentId, usize>>,
    started: Mutex<HashSet<AgentId>>,
    known_sessions: Mutex<HashMap<AgentId, String>>,
    resume_header: Mutex<Option<String>>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
    shutdown: Notify,
    id_gen: UuidIdGen,
}

impl Orchestrator<SystemClock> {
    pub fn new(
        drivers: Vec<Arc<dyn AgentDriver>>,
        config: OrchestratorConfig,
        hooks: RendererHooks,
    ) -> Self {
        Self::with_clock(drivers, config, hooks, SystemClock)
    }
}

impl<C: Clock> Orchestrator<C> {
    pub fn with_clock(
        drivers: Vec<Arc<dyn AgentDriver>>,
        config: OrchestratorConfig,
        hooks: RendererHooks,
        clock: C,
    ) -> Self {
        let OrchestratorConfig { user, project_dir } = config;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let bus = Arc::new(MessageBus::with_clock(user.max_messages, clock.clone()));

        // Bus events fan into the loop
        let tx = inbound_tx.clone();
        bus.subscribe(Arc::new(move |event| {
            let _ = tx.send(Inbound::Bus(event.clone()));
        }));

        let drivers: HashMap<AgentId, Arc<dyn AgentDriver>> = drivers
            .into_iter()
            .map(|driver| (driver.agent_id(), driver))
            .collect();

        // Backpressure probe over the live driver queues
        let probe_drivers = drivers.clone();
        bus.set_queue_probe(Arc::new(move |agent| {
            probe_drivers
                .get(&agent)
                .map(|d| d.queue_depth())
                .unwrap_or(0)
        }));

        // Driver streams fan into the loop
        for driver in drivers.values() {
            let tx = inbound_tx.clone();
            driver.on_output(Arc::new(move |agent, line| {
                let _ = tx.send(Inbound::DriverOutput(agent, line.clone()));
            }));
            let tx = inbound_tx.clone();
            driver.on_status_change(Arc::new(move |agent, status| {
                let _ = tx.send(Inbound::DriverStatus(agent, status));
            }));
        }

        let controller_config = RelayControllerConfig {
            max_relays_per_window: user.max_relays_per_window,
            relay_window: Duration::from_millis(user.relay_window_ms),
            max_cross_talk_per_round: user.max_cross_talk_per_round,
            ..RelayControllerConfig::default()
        };
        let tx = inbound_tx.clone();
        let task_tx = inbound_tx.clone();
        let controller = RelayController::new(
            Arc::clone(&bus),
            clock,
            controller_config,
            Arc::new(move |agent, line: &OutputLine| {
                let _ = tx.send(Inbound::ControllerOutput(agent, line.clone()));
            }),
            Some(Arc::new(move |tasks: &[TaskItem]| {
                let _ = task_tx.send(Inbound::TaskUpdate(tasks.to_vec()));
            })),
        );

        let throttle = user
            .checkpoint_throttle_ms
            .map(Duration::from_millis)
            .unwrap_or(SESSION_THROTTLE);
        let store = SessionStore::new(project_dir.clone(), throttle);

        Self {
            inner: Arc::new(Inner {
                bus,
                controller,
                drivers,
                store,
                config: user,
                hooks: Mutex::new(hooks),
                project_dir,
                cursors: Mutex::new(HashMap::new()),
                started: Mutex::new(HashSet::new()),
                known_sessions: Mutex::new(HashMap::new()),
                resume_header: Mutex::new(None),
                inbound_rx: Mutex::new(Some(inbound_rx)),
                shutdown: Notify::new(),
                id_gen: UuidIdGen,
            }),
        }
    }

    /// The bus, for control-surface callers and tests.
    pub fn bus(&self) -> Arc<MessageBus<C>> {
        Arc::clone(&self.inner.bus)
    }

    /// Replace the renderer callbacks (e.g. when a UI attaches late).
    pub fn bind(&self, hooks: RendererHooks) {
        *self.inner.hooks.lock() = hooks;
    }

    /// Current task board snapshot.
    pub fn tasks(&self) -> Vec<TaskItem> {
        self.inner.controller.tasks()
    }

    /// Active session snapshot.
    pub fn session(&self) -> Option<fedi_storage::SessionData> {
        self.inner.store.snapshot()
    }

    /// Create a session and hand the task to the lead.
    pub fn start_with_task(&self, task: &str) -> SessionId {
        let id = SessionId::new(self.inner.id_gen.next());
        self.inner.store.create(id.clone(), task);
        tracing::info!(session_id = %id, "session started");
        self.inner
            .bus
            .send(MessageDraft::new(Sender::User, AgentId::Lead, task));
        id
    }

    /// Route user input: `@worker_a …` goes straight to that agent,
    /// anything else to the lead.
    pub fn send_user_input(&self, text: &str) -> Result<(), OrchestratorError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        self.inner.controller.reset_round();

        let (target, content) = match text.strip_prefix('@') {
            Some(rest) => {
                let (name, content) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let agent: AgentId = name
                    .parse()
                    .map_err(|_| OrchestratorError::UnknownAgent(name.to_string()))?;
                (agent, content.trim())
            }
            None => (AgentId::Lead, text),
        };
        if content.is_empty() {
            return Ok(());
        }
        self.inner
            .bus
            .send(MessageDraft::new(Sender::User, target, content));
        Ok(())
    }

    /// Load a stored session and prepare the resume handshake.
    pub fn resume(&self, id: &SessionId) -> Result<(), OrchestratorError> {
        let session = load_session(&self.inner.project_dir, id)?
            .ok_or_else(|| OrchestratorError::SessionNotFound(id.clone()))?;

        for (agent, external) in &session.agent_sessions {
            if let Some(driver) = self.inner.drivers.get(agent) {
                driver.resume_session(external.clone());
            }
            self.inner
                .known_sessions
                .lock()
                .insert(*agent, external.clone());
        }

        let mut header = String::from("── SESSION RESUME ──\n");
        header.push_str(&format!("Tâche / task: {}\n", session.task));
        for message in session.last_messages(RESUME_REPLAY) {
            header.push_str(&format!(
                "[{}→{}] {}\n",
                message.from,
                message.to,
                truncate(&message.content, 200)
            ));
        }
        *self.inner.resume_header.lock() = Some(header);

        tracing::info!(session_id = %id, messages = session.messages.len(), "session resumed");
        self.inner.store.adopt(session);
        Ok(())
    }

    /// Finalize the session and stop every driver.
    pub async fn stop(&self) -> Result<(), OrchestratorError> {
        tracing::info!("orchestrator stopping");
        let finalize = self.inner.store.finalize();

        let grace = Duration::from_millis(self.inner.config.delegate_timeout_ms);
        let drivers: Vec<Arc<dyn AgentDriver>> = self.inner.drivers.values().cloned().collect();
        let shutdown_all = async {
            for driver in &drivers {
                driver.stop().await;
            }
        };
        if tokio::time::timeout(grace, shutdown_all).await.is_err() {
            tracing::warn!("driver shutdown exceeded delegate timeout");
        }

        // notify_one stores a permit, so the loop stops even if it is
        // mid-event rather than parked on the select.
        self.inner.shutdown.notify_one();
        finalize?;
        Ok(())
    }

    /// Drive the orchestration loop until `stop()`.
    pub async fn run(&self) {
        let Some(mut inbound) = self.inner.inbound_rx.lock().take() else {
            tracing::warn!("orchestrator loop already running");
            return;
        };
        let mut tick = tokio::time::interval(CONTROLLER_TICK);

        loop {
            tokio::select! {
                maybe = inbound.recv() => match maybe {
                    Some(event) => self.inner.handle(event).await,
                    None => break,
                },
                _ = tick.tick() => self.inner.controller.on_tick(),
                _ = self.inner.shutdown.notified() => break,
            }
        }
        tracing::debug!("orchestrator loop exited");
    }
}

impl<C: Clock> Inner<C> {
    /// Clone-out of the current hook set; callbacks run lock-free.
    fn hooks(&self) -> RendererHooks {
        self.hooks.lock().clone()
    }

    async fn handle(&self, event: Inbound) {
        match event {
            Inbound::Bus(BusEvent::Message(message)) => {
                self.store.append_message(message);
            }
            Inbound::Bus(BusEvent::Delivery { agent, message }) => {
                self.deliver(agent, message).await;
            }
            Inbound::Bus(BusEvent::Relay(message)) => {
                (self.hooks().on_relay)(&message);
            }
            Inbound::Bus(BusEvent::RelayBlocked(blocked)) => {
                let hooks = self.hooks();
                (hooks.on_relay_blocked)(&blocked);
                if let Some(source) = blocked.from.agent() {
                    let text = format!(
                        "relais vers {} bloqué / relay to {} blocked ({})",
                        blocked.to, blocked.to, blocked.reason
                    );
                    (hooks.on_agent_output)(source, &OutputLine::info(text.clone()));
                    // Recorded, not routed: the session keeps a trace of
                    // the refusal without triggering a turn.
                    self.bus
                        .record(MessageDraft::new(Sender::System, source, text));
                }
            }
            Inbound::DriverOutput(agent, line) => {
                self.controller.on_output(agent, &line);
            }
            Inbound::DriverStatus(agent, status) => {
                self.controller.on_status(agent, status);
                (self.hooks().on_agent_status)(agent, status);
                if status == AgentStatus::Waiting {
                    self.capture_external_session(agent);
                }
            }
            Inbound::ControllerOutput(agent, line) => {
                (self.hooks().on_agent_output)(agent, &line);
            }
            Inbound::TaskUpdate(tasks) => {
                (self.hooks().on_task_update)(&tasks);
            }
        }
    }

    /// Hand one routed message to the target driver as its next prompt.
    async fn deliver(&self, agent: AgentId, message: Message) {
        let Some(driver) = self.drivers.get(&agent) else {
            tracing::warn!(%agent, "delivery for unknown driver");
            return;
        };

        self.controller.note_delivery(agent, &message);

        if let Err(e) = self.ensure_started(agent, driver).await {
            let hooks = self.hooks();
            let notice =
                OutputLine::info(format!("agent indisponible / agent unavailable: {e}"));
            (hooks.on_agent_output)(agent, &notice);
            (hooks.on_agent_status)(agent, AgentStatus::Error);
            return;
        }

        let prompt = self.compose_prompt(agent, &message);
        if let Err(e) = driver.send(prompt).await {
            tracing::warn!(%agent, error = %e, "prompt dispatch failed");
            let notice = OutputLine::info(format!("envoi échoué / send failed: {e}"));
            (self.hooks().on_agent_output)(agent, &notice);
        }
    }

    /// Lazily start a driver on its first directed message.
    async fn ensure_started(
        &self,
        agent: AgentId,
        driver: &Arc<dyn AgentDriver>,
    ) -> Result<(), OrchestratorError> {
        if self.started.lock().contains(&agent) {
            return Ok(());
        }
        let system_prompt = if agent.is_lead() {
            LEAD_SYSTEM_PROMPT
        } else {
            WORKER_SYSTEM_PROMPT
        };
        driver.start(Some(system_prompt.to_string())).await?;
        self.started.lock().insert(agent);
        tracing::debug!(%agent, "driver started lazily");
        Ok(())
    }

    /// Prefix the resume header (lead only, once) and any fresh context
    /// summary onto the routed content.
    fn compose_prompt(&self, agent: AgentId, message: &Message) -> String {
        let mut prompt = String::new();

        if agent.is_lead() {
            if let Some(header) = self.resume_header.lock().take() {
                prompt.push_str(&header);
                prompt.push('\n');
            }
        }

        let since = self.cursors.lock().get(&agent).copied().unwrap_or(0);
        let (summary, cursor) = self.bus.context_summary(agent, since, CONTEXT_MAX);
        self.cursors.lock().insert(agent, cursor);
        if !summary.is_empty() {
            prompt.push_str("Contexte récent / recent context:\n");
            prompt.push_str(&summary);
            prompt.push_str("\n\n");
        }

        match message.from.agent() {
            Some(from) if message.relay_count > 0 => {
                prompt.push_str(&format!("[from {}] ", from));
            }
            _ => {}
        }
        prompt.push_str(&message.content);
        prompt
    }

    /// Persist a newly captured external session id.
    fn capture_external_session(&self, agent: AgentId) {
        let Some(external) = self
            .drivers
            .get(&agent)
            .and_then(|d| d.external_session_id())
        else {
            return;
        };
        let mut known = self.known_sessions.lock();
        if known.get(&agent).map(String::as_str) == Some(external.as_str()) {
            return;
        }
        known.insert(agent, external.clone());
        drop(known);
        self.store.set_agent_session(agent, external);
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max - 1).collect();
    format!("{}…", cut)
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
