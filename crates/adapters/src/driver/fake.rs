// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted in-memory driver for tests.
//!
//! Records every call and lets the test drive outputs and status
//! transitions by hand, so controller and orchestrator logic can be
//! exercised without spawning subprocesses.

use super::{AgentDriver, DriverError, OutputHandler, StatusHandler};
use async_trait::async_trait;
use fedi_core::{AgentId, AgentStatus, OutputLine};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

struct FakeState {
    status: AgentStatus,
    started: bool,
    sent: Vec<String>,
    queue: VecDeque<String>,
    external_session_id: Option<String>,
    last_error: Option<String>,
    system_prompt: Option<String>,
    fail_send: bool,
    output_handlers: Vec<OutputHandler>,
    status_handlers: Vec<StatusHandler>,
}

/// Hand-driven [`AgentDriver`] double.
#[derive(Clone)]
pub struct FakeDriver {
    agent_id: AgentId,
    state: Arc<Mutex<FakeState>>,
}

impl FakeDriver {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            state: Arc::new(Mutex::new(FakeState {
                status: AgentStatus::Idle,
                started: false,
                sent: Vec::new(),
                queue: VecDeque::new(),
                external_session_id: None,
                last_error: None,
                system_prompt: None,
                fail_send: false,
                output_handlers: Vec::new(),
                status_handlers: Vec::new(),
            })),
        }
    }

    /// Every prompt dispatched so far (queued ones included on dispatch).
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// System prompt the orchestrator passed to `start`.
    pub fn system_prompt(&self) -> Option<String> {
        self.state.lock().system_prompt.clone()
    }

    /// Make subsequent `send` calls fail.
    pub fn fail_sends(&self) {
        self.state.lock().fail_send = true;
    }

    /// Push an output line to observers, as a real turn would.
    pub fn emit(&self, line: OutputLine) {
        let handlers: Vec<OutputHandler> = self.state.lock().output_handlers.clone();
        for handler in handlers {
            handler(self.agent_id, &line);
        }
    }

    pub fn emit_stdout(&self, text: &str) {
        self.emit(OutputLine::stdout(text));
    }

    /// Drive a status transition, notifying observers.
    pub fn set_status(&self, status: AgentStatus) {
        let handlers: Vec<StatusHandler> = {
            let mut state = self.state.lock();
            if state.status == status {
                return;
            }
            state.status = status;
            state.status_handlers.clone()
        };
        for handler in handlers {
            handler(self.agent_id, status);
        }
    }

    /// End the running turn: dispatch the next queued prompt or go to
    /// Waiting, mirroring the real driver's terminal-event handling.
    pub fn complete_turn(&self) {
        let next = self.state.lock().queue.pop_front();
        match next {
            Some(prompt) => {
                self.state.lock().sent.push(prompt);
                self.set_status(AgentStatus::Waiting);
                self.set_status(AgentStatus::Running);
            }
            None => self.set_status(AgentStatus::Waiting),
        }
    }
}

#[async_trait]
impl AgentDriver for FakeDriver {
    fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    async fn start(&self, system_prompt: Option<String>) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.started = true;
        state.system_prompt = system_prompt;
        if state.status == AgentStatus::Stopped {
            state.status = AgentStatus::Idle;
        }
        Ok(())
    }

    async fn send(&self, prompt: String) -> Result<(), DriverError> {
        let dispatch_now = {
            let mut state = self.state.lock();
            if !state.started {
                return Err(DriverError::NotStarted);
            }
            if state.fail_send {
                return Err(DriverError::Send("scripted failure".to_string()));
            }
            if state.status == AgentStatus::Running {
                state.queue.push_back(prompt);
                false
            } else {
                state.sent.push(prompt);
                true
            }
        };
        if dispatch_now {
            self.set_status(AgentStatus::Running);
        }
        Ok(())
    }

    async fn stop(&self) {
        self.set_status(AgentStatus::Stopped);
    }

    fn status(&self) -> AgentStatus {
        self.state.lock().status
    }

    fn queue_depth(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn external_session_id(&self) -> Option<String> {
        self.state.lock().external_session_id.clone()
    }

    fn resume_session(&self, external_id: String) {
        self.state.lock().external_session_id = Some(external_id);
    }

    fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    fn on_output(&self, handler: OutputHandler) {
        self.state.lock().output_handlers.push(handler);
    }

    fn on_status_change(&self, handler: StatusHandler) {
        self.state.lock().status_handlers.push(handler);
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
