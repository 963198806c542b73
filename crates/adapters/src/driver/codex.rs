// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Codex CLI profile.
//!
//! Invocation shape per turn:
//!
//! ```text
//! codex exec --json [--model <m>] [--resume <session>] <prompt>
//! ```
//!
//! Codex has no system-prompt flag; on the first turn the system prompt
//! is folded into the prompt text. Event vocabulary: `session.created`
//! announces the session id, `item.completed` carries agent messages and
//! command executions, `turn.completed` / `turn.failed` are terminal.

use super::turn::CliDriver;
use super::{CliProfile, DriverConfig, EventAction};
use fedi_core::OutputLine;
use serde_json::Value;
use tokio::process::Command;

/// Driver for the Codex CLI.
pub type CodexDriver = CliDriver<CodexProfile>;

#[derive(Debug, Clone, Default)]
pub struct CodexProfile;

impl CodexProfile {
    pub fn driver(config: DriverConfig) -> CodexDriver {
        CliDriver::new(CodexProfile, config)
    }
}

fn get_str<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

impl CliProfile for CodexProfile {
    fn build_command(
        &self,
        config: &DriverConfig,
        prompt: &str,
        resume: Option<&str>,
        system_prompt: Option<&str>,
    ) -> Command {
        let mut cmd = Command::new(&config.cli_path);
        cmd.arg("exec").arg("--json");
        if let Some(model) = &config.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(session) = resume {
            cmd.arg("--resume").arg(session);
        }
        match system_prompt {
            Some(system) => cmd.arg(format!("{system}\n\n{prompt}")),
            None => cmd.arg(prompt),
        };
        cmd
    }

    fn map_event(&self, event: &Value) -> Vec<EventAction> {
        match get_str(event, "type") {
            Some("session.created") => get_str(event, "session_id")
                .map(|s| vec![EventAction::CaptureSession(s.to_string())])
                .unwrap_or_default(),
            Some("item.completed") => map_item(event),
            Some("turn.completed") => vec![EventAction::Terminal { final_text: None }],
            Some("turn.failed") => {
                let message = event
                    .get("error")
                    .and_then(|e| get_str(e, "message"))
                    .unwrap_or("unknown error");
                vec![
                    EventAction::Failure(format!("erreur de l'agent / agent error: {message}")),
                    EventAction::Terminal { final_text: None },
                ]
            }
            Some("error") => {
                let message = get_str(event, "message").unwrap_or("unknown error");
                vec![EventAction::Failure(format!(
                    "erreur de l'agent / agent error: {message}"
                ))]
            }
            _ => Vec::new(),
        }
    }
}

fn map_item(event: &Value) -> Vec<EventAction> {
    let Some(item) = event.get("item") else {
        return Vec::new();
    };
    match get_str(item, "type") {
        Some("agent_message") => get_str(item, "text")
            .filter(|t| !t.trim().is_empty())
            .map(|t| vec![EventAction::Emit(OutputLine::stdout(t))])
            .unwrap_or_default(),
        Some("command_execution") => {
            let command = get_str(item, "command").unwrap_or("");
            vec![EventAction::Emit(OutputLine::system(format!(
                "▸ bash {command}"
            )))]
        }
        Some("file_change") => {
            let path = get_str(item, "path").unwrap_or("");
            vec![EventAction::Emit(OutputLine::system(format!("▸ edit {path}")))]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
#[path = "codex_tests.rs"]
mod tests;
