// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fedi: relay orchestrator for autonomous coding agents.
//!
//! Thin entry point: parse arguments, load config, install the log
//! sink, wire the orchestrator to real CLI drivers and the plain
//! renderer, then shuttle stdin lines in until stop.
//!
//! Exit codes: 0 normal stop, 1 unrecoverable error, 2 malformed
//! config, 130 interrupted.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod logging;
mod render;

use clap::Parser;
use fedi_adapters::driver::{ClaudeProfile, CodexProfile};
use fedi_adapters::{AgentDriver, DriverConfig};
use fedi_core::{AgentId, ConfigError, SessionId, UserConfig};
use fedi_engine::{Orchestrator, OrchestratorConfig, OrchestratorError};
use fedi_storage::{list_sessions, SessionSummary};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Orchestrateur d'agents de code / relay orchestrator for coding agents
#[derive(Debug, Parser)]
#[command(name = "fedi", version)]
struct Cli {
    /// Task handed to the lead agent
    task: Vec<String>,

    /// Resume a stored session by id
    #[arg(long, value_name = "SESSION_ID", conflicts_with = "list")]
    resume: Option<String>,

    /// List stored sessions for this project
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() {
    let code = run(Cli::parse()).await;
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    let config = match UserConfig::load(&UserConfig::default_path()) {
        Ok(config) => config,
        Err(ConfigError::Malformed(detail)) => {
            eprintln!("fedi: config invalide / malformed config: {detail}");
            return 2;
        }
        Err(e) => {
            eprintln!("fedi: {e}");
            return 1;
        }
    };

    let project_dir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("fedi: cannot resolve working directory: {e}");
            return 1;
        }
    };

    if cli.list {
        for session in list_sessions(&project_dir) {
            println!("{}", format_session_line(&session));
        }
        return 0;
    }

    let task = cli.task.join(" ");
    if task.trim().is_empty() && cli.resume.is_none() {
        eprintln!("fedi: nothing to do (pass a task, --resume or --list)");
        return 1;
    }

    // Log sink failures must not take the orchestration down
    let _log_guards = match logging::init(&UserConfig::logs_dir(), config.max_log_files) {
        Ok(guards) => Some(guards),
        Err(e) => {
            eprintln!("fedi: journalisation indisponible / logging unavailable: {e}");
            None
        }
    };

    let orchestrator = Orchestrator::new(
        build_drivers(&config, &project_dir),
        OrchestratorConfig {
            user: config,
            project_dir,
        },
        render::plain_hooks(),
    );

    if let Some(id) = &cli.resume {
        if let Err(e) = orchestrator.resume(&SessionId::new(id.as_str())) {
            eprintln!("fedi: {e}");
            return 1;
        }
        println!("session reprise / session resumed: {id}");
    }
    if !task.trim().is_empty() {
        let id = orchestrator.start_with_task(task.trim());
        println!("session: {}", id.short(8));
    }

    let runner = orchestrator.clone();
    tokio::spawn(async move { runner.run().await });

    let interrupted = input_loop(&orchestrator).await;

    if let Err(e) = orchestrator.stop().await {
        tracing::error!(error = %e, "shutdown failed");
        if !interrupted {
            eprintln!("fedi: {e}");
            return 1;
        }
    }
    if interrupted {
        130
    } else {
        0
    }
}

/// Shuttle stdin lines into the orchestrator until EOF, `/quit`, or
/// Ctrl-C. Returns true when interrupted.
async fn input_loop(orchestrator: &Orchestrator) -> bool {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line == "/quit" {
                        return false;
                    }
                    match orchestrator.send_user_input(line) {
                        Ok(()) => {}
                        Err(OrchestratorError::UnknownAgent(name)) => {
                            eprintln!("fedi: agent inconnu / unknown agent: @{name}");
                        }
                        Err(e) => eprintln!("fedi: {e}"),
                    }
                }
                Ok(None) | Err(_) => return false,
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                return true;
            }
        }
    }
}

/// One driver per agent: Claude for the lead and worker A, Codex for
/// worker B, each with its configured binary, model, and turn budget.
fn build_drivers(config: &UserConfig, project_dir: &Path) -> Vec<Arc<dyn AgentDriver>> {
    AgentId::all()
        .iter()
        .map(|&agent| {
            let settings = config.agent(agent);
            let mut driver_config =
                DriverConfig::new(agent, settings.cli_path.clone(), project_dir.to_path_buf());
            driver_config.model = settings.model.clone();
            driver_config.turn_timeout = config.turn_timeout(agent);
            match agent {
                AgentId::WorkerB => {
                    Arc::new(CodexProfile::driver(driver_config)) as Arc<dyn AgentDriver>
                }
                _ => Arc::new(ClaudeProfile::driver(driver_config)),
            }
        })
        .collect()
}

/// `<id8>  <started>  <state>  <task>` listing line.
fn format_session_line(session: &SessionSummary) -> String {
    let state = if session.finished_at.is_some() {
        "terminée / finished"
    } else {
        "en cours / open"
    };
    format!(
        "{:<10} {}  {:<20} {}",
        session.id.short(8),
        session.started_at.format("%Y-%m-%d %H:%M"),
        state,
        session.task
    )
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
