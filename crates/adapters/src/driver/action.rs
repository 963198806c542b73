// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-line action indicators for tool-use events.

use serde_json::Value;

/// Longest command fragment shown in a `▸ bash` indicator.
const COMMAND_MAX: usize = 60;

/// Render a tool-use event as a single action line.
///
/// Known tools get a readable argument (`▸ read src/lib.rs`); anything
/// unrecognized falls back to the bare tool name.
pub fn format_tool_action(name: &str, input: &Value) -> String {
    let get = |key: &str| input.get(key).and_then(Value::as_str).unwrap_or("");
    match name {
        "Read" => format!("▸ read {}", get("file_path")),
        "Write" => format!("▸ write {}", get("file_path")),
        "Edit" => format!("▸ edit {}", get("file_path")),
        "Grep" => format!("▸ grep {}", get("pattern")),
        "Glob" => format!("▸ glob {}", get("pattern")),
        "Bash" => format!("▸ bash {}", clean_command(get("command"))),
        "WebSearch" => format!("▸ search {}", get("query")),
        other => format!("▸ {}", other.to_lowercase()),
    }
}

/// Flatten a shell command to one trimmed line, capped for display.
fn clean_command(command: &str) -> String {
    let one_line = command
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if one_line.chars().count() <= COMMAND_MAX {
        return one_line;
    }
    let cut: String = one_line.chars().take(COMMAND_MAX - 1).collect();
    format!("{}…", cut)
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
