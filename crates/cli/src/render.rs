// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plain line renderer.
//!
//! The real UI is a separate concern; this binary ships the smallest
//! renderer that makes the orchestration observable: one prefixed line
//! per callback. The core never prints; everything user-visible goes
//! through these hooks.

use fedi_core::{AgentStatus, OutputKind};
use fedi_engine::RendererHooks;
use std::sync::Arc;

/// Hooks that print every event as one plain stdout line.
pub fn plain_hooks() -> RendererHooks {
    RendererHooks {
        on_agent_output: Arc::new(|agent, line| match line.kind {
            OutputKind::Stdout => println!("{agent} │ {}", line.text),
            OutputKind::System => println!("{agent} {}", line.text),
            OutputKind::Info => println!("{agent} ⚠ {}", line.text),
            // Raw stderr and internal relay markers stay in the log
            OutputKind::Stderr | OutputKind::Relay => {}
        }),
        on_agent_status: Arc::new(|agent, status| match status {
            AgentStatus::Running => {}
            status => println!("· {agent}: {status}"),
        }),
        on_relay: Arc::new(|message| {
            println!("⇄ {} → {}", message.from, message.to);
        }),
        on_relay_blocked: Arc::new(|blocked| {
            println!("⇄ {} → {} refusé / blocked ({})", blocked.from, blocked.to, blocked.reason);
        }),
        on_task_update: Arc::new(|tasks| {
            let done = tasks.iter().filter(|t| t.done).count();
            println!("☰ tâches / tasks: {done}/{} done", tasks.len());
        }),
    }
}
