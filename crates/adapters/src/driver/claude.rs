// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claude Code CLI profile.
//!
//! Invocation shape per turn:
//!
//! ```text
//! claude -p <prompt> --output-format stream-json --verbose \
//!        [--model <m>] [--resume <session>] [--append-system-prompt <s>]
//! ```
//!
//! Event vocabulary: `system/init` announces the session id, `assistant`
//! carries text and tool_use content blocks, `result` is the terminal
//! event, `error` is recoverable.

use super::action::format_tool_action;
use super::turn::CliDriver;
use super::{CliProfile, DriverConfig, EventAction};
use fedi_core::OutputLine;
use serde_json::Value;
use tokio::process::Command;

/// Driver for the Claude Code CLI.
pub type ClaudeDriver = CliDriver<ClaudeProfile>;

#[derive(Debug, Clone, Default)]
pub struct ClaudeProfile;

impl ClaudeProfile {
    pub fn driver(config: DriverConfig) -> ClaudeDriver {
        CliDriver::new(ClaudeProfile, config)
    }
}

fn get_str<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

impl CliProfile for ClaudeProfile {
    fn build_command(
        &self,
        config: &DriverConfig,
        prompt: &str,
        resume: Option<&str>,
        system_prompt: Option<&str>,
    ) -> Command {
        let mut cmd = Command::new(&config.cli_path);
        cmd.arg("-p")
            .arg(prompt)
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose");
        if let Some(model) = &config.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(session) = resume {
            cmd.arg("--resume").arg(session);
        }
        if let Some(system) = system_prompt {
            cmd.arg("--append-system-prompt").arg(system);
        }
        cmd
    }

    fn map_event(&self, event: &Value) -> Vec<EventAction> {
        match get_str(event, "type") {
            Some("system") => {
                if get_str(event, "subtype") == Some("init") {
                    if let Some(session) = get_str(event, "session_id") {
                        return vec![EventAction::CaptureSession(session.to_string())];
                    }
                }
                Vec::new()
            }
            Some("assistant") => map_assistant(event),
            Some("result") => map_result(event),
            Some("error") => {
                let message = get_str(event, "message")
                    .or_else(|| get_str(event, "error"))
                    .unwrap_or("unknown error");
                vec![EventAction::Failure(format!(
                    "erreur de l'agent / agent error: {message}"
                ))]
            }
            _ => Vec::new(),
        }
    }
}

/// Text parts become stdout lines; tool_use blocks become action lines.
fn map_assistant(event: &Value) -> Vec<EventAction> {
    let Some(content) = event
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let mut actions = Vec::new();
    for block in content {
        match get_str(block, "type") {
            Some("text") => {
                if let Some(text) = get_str(block, "text") {
                    if !text.trim().is_empty() {
                        actions.push(EventAction::Emit(OutputLine::stdout(text)));
                    }
                }
            }
            Some("tool_use") => {
                let name = get_str(block, "name").unwrap_or("tool");
                let input = block.get("input").cloned().unwrap_or(Value::Null);
                actions.push(EventAction::Emit(OutputLine::system(format_tool_action(
                    name, &input,
                ))));
            }
            _ => {}
        }
    }
    actions
}

fn map_result(event: &Value) -> Vec<EventAction> {
    let text = get_str(event, "result").map(str::to_string);
    let is_error = event
        .get("is_error")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if is_error {
        let message = text.unwrap_or_else(|| "unknown error".to_string());
        return vec![
            EventAction::Failure(format!("erreur de l'agent / agent error: {message}")),
            EventAction::Terminal { final_text: None },
        ];
    }
    vec![EventAction::Terminal { final_text: text }]
}

#[cfg(test)]
#[path = "claude_tests.rs"]
mod tests;
