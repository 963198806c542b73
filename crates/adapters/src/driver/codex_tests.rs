// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fedi_core::{AgentId, OutputKind};
use serde_json::json;

fn profile() -> CodexProfile {
    CodexProfile
}

fn config() -> DriverConfig {
    DriverConfig::new(AgentId::WorkerB, "codex", "/tmp".into())
}

#[test]
fn command_uses_exec_json_with_positional_prompt() {
    let cmd = profile().build_command(&config(), "do it", Some("ext-7"), None);
    let args: Vec<String> = cmd
        .as_std()
        .get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    assert_eq!(args, vec!["exec", "--json", "--resume", "ext-7", "do it"]);
}

#[test]
fn system_prompt_is_folded_into_first_prompt() {
    let cmd = profile().build_command(&config(), "task", None, Some("you are worker b"));
    let args: Vec<String> = cmd
        .as_std()
        .get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    assert_eq!(args.last().map(String::as_str), Some("you are worker b\n\ntask"));
}

#[test]
fn session_created_captures_session() {
    let actions = profile().map_event(&json!({"type": "session.created", "session_id": "ext-9"}));
    assert_eq!(
        actions,
        vec![EventAction::CaptureSession("ext-9".to_string())]
    );
}

#[test]
fn agent_message_becomes_stdout() {
    let event = json!({"type": "item.completed", "item": {"type": "agent_message", "text": "hello"}});
    match &profile().map_event(&event)[0] {
        EventAction::Emit(line) => {
            assert_eq!(line.kind, OutputKind::Stdout);
            assert_eq!(line.text, "hello");
        }
        other => panic!("unexpected action: {:?}", other),
    }
}

#[test]
fn command_execution_becomes_action_indicator() {
    let event = json!({"type": "item.completed", "item": {"type": "command_execution", "command": "cargo test"}});
    match &profile().map_event(&event)[0] {
        EventAction::Emit(line) => {
            assert_eq!(line.kind, OutputKind::System);
            assert_eq!(line.text, "▸ bash cargo test");
        }
        other => panic!("unexpected action: {:?}", other),
    }
}

#[test]
fn turn_completed_is_terminal() {
    let actions = profile().map_event(&json!({"type": "turn.completed"}));
    assert_eq!(actions, vec![EventAction::Terminal { final_text: None }]);
}

#[test]
fn turn_failed_fails_then_terminates() {
    let event = json!({"type": "turn.failed", "error": {"message": "quota"}});
    let actions = profile().map_event(&event);
    assert!(matches!(&actions[0], EventAction::Failure(m) if m.contains("quota")));
    assert_eq!(actions[1], EventAction::Terminal { final_text: None });
}

#[test]
fn reasoning_items_are_ignored() {
    let event = json!({"type": "item.completed", "item": {"type": "reasoning", "text": "thinking"}});
    assert!(profile().map_event(&event).is_empty());
}
