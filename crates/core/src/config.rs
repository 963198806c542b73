// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User configuration loaded from `~/.fedi/config.json`.
//!
//! Every field is validated independently: an invalid value falls back to
//! its documented default with a logged warning, never failing the load.
//! Only a file that is unreadable as a JSON object at all is an error
//! (the binary maps it to exit code 2).

use crate::agent::AgentId;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file is not a JSON object: {0}")]
    Malformed(String),
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-agent CLI settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    /// Binary to invoke for this agent's turns.
    pub cli_path: String,
    /// Model override passed through to the CLI, if any.
    pub model: Option<String>,
}

/// Validated user configuration with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserConfig {
    /// Wall-clock budget for one agent turn.
    pub exec_timeout_ms: u64,
    /// Grace budget when awaiting driver exits during `stop()`.
    pub delegate_timeout_ms: u64,
    /// Relay rate limit: max relays per sliding window.
    pub max_relays_per_window: usize,
    /// Relay rate limit: window width.
    pub relay_window_ms: u64,
    /// Renderer/controller flush tick interval.
    pub flush_interval_ms: u64,
    /// Correlation-counter map cap.
    pub max_messages: usize,
    /// Ceiling on worker↔worker exchanges per orchestration round.
    pub max_cross_talk_per_round: usize,
    /// Log file pairs kept by the rotating sink.
    pub max_log_files: usize,
    /// Session save debounce override; absent means the store default.
    pub checkpoint_throttle_ms: Option<u64>,
    /// Codex turn budget override; 0 means wait indefinitely.
    pub codex_timeout_ms: Option<u64>,
    pub lead: AgentSettings,
    pub worker_a: AgentSettings,
    pub worker_b: AgentSettings,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            exec_timeout_ms: 120_000,
            delegate_timeout_ms: 180_000,
            max_relays_per_window: 50,
            relay_window_ms: 60_000,
            flush_interval_ms: 400,
            max_messages: 200,
            max_cross_talk_per_round: 20,
            max_log_files: 20,
            checkpoint_throttle_ms: None,
            codex_timeout_ms: None,
            lead: AgentSettings {
                cli_path: "claude".to_string(),
                model: None,
            },
            worker_a: AgentSettings {
                cli_path: "claude".to_string(),
                model: None,
            },
            worker_b: AgentSettings {
                cli_path: "codex".to_string(),
                model: None,
            },
        }
    }
}

impl UserConfig {
    /// The configuration directory, `~/.fedi`.
    pub fn config_dir() -> PathBuf {
        dirs::home_dir().unwrap_or_default().join(".fedi")
    }

    /// Default config file location, `~/.fedi/config.json`.
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Log directory for the rotating sink, `~/.fedi/logs`.
    pub fn logs_dir() -> PathBuf {
        Self::config_dir().join("logs")
    }

    /// Load configuration from `path`.
    ///
    /// A missing file yields the defaults. A file that parses as a JSON
    /// object is mined field by field; anything else is `Malformed`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Malformed(e.to_string()))?;
        let obj = match value.as_object() {
            Some(obj) => obj,
            None => {
                return Err(ConfigError::Malformed(format!(
                    "expected object, found {}",
                    json_kind(&value)
                )))
            }
        };

        let mut config = Self::default();
        read_ms(obj, "execTimeoutMs", &mut config.exec_timeout_ms);
        read_ms(obj, "delegateTimeoutMs", &mut config.delegate_timeout_ms);
        read_count(obj, "maxRelaysPerWindow", &mut config.max_relays_per_window);
        read_ms(obj, "relayWindowMs", &mut config.relay_window_ms);
        read_ms(obj, "flushIntervalMs", &mut config.flush_interval_ms);
        read_count(obj, "maxMessages", &mut config.max_messages);
        read_count(obj, "maxCrossTalkPerRound", &mut config.max_cross_talk_per_round);
        read_count(obj, "maxLogFiles", &mut config.max_log_files);

        if let Some(value) = obj.get("checkpointThrottleMs") {
            match value.as_u64() {
                Some(ms) if ms > 0 => config.checkpoint_throttle_ms = Some(ms),
                _ => warn_invalid("checkpointThrottleMs", value),
            }
        }

        // codexTimeoutMs accepts 0 ("wait indefinitely"), unlike the
        // strictly-positive duration fields.
        if let Some(value) = obj.get("codexTimeoutMs") {
            match value.as_u64() {
                Some(ms) => config.codex_timeout_ms = Some(ms),
                None => warn_invalid("codexTimeoutMs", value),
            }
        }

        read_agent(obj, "lead", &mut config.lead);
        read_agent(obj, "workerA", &mut config.worker_a);
        read_agent(obj, "workerB", &mut config.worker_b);

        Ok(config)
    }

    /// Settings for one agent.
    pub fn agent(&self, id: AgentId) -> &AgentSettings {
        match id {
            AgentId::Lead => &self.lead,
            AgentId::WorkerA => &self.worker_a,
            AgentId::WorkerB => &self.worker_b,
        }
    }

    /// Turn budget for one agent. Codex workers honour the override;
    /// `None` means no limit.
    pub fn turn_timeout(&self, id: AgentId) -> Option<Duration> {
        let ms = match (id, self.codex_timeout_ms) {
            (AgentId::WorkerB, Some(0)) => return None,
            (AgentId::WorkerB, Some(ms)) => ms,
            _ => self.exec_timeout_ms,
        };
        Some(Duration::from_millis(ms))
    }
}

/// Read a strictly-positive millisecond field, keeping the default on
/// absent or invalid values.
fn read_ms(obj: &serde_json::Map<String, Value>, key: &str, slot: &mut u64) {
    let Some(value) = obj.get(key) else { return };
    match value.as_u64() {
        Some(ms) if ms > 0 => *slot = ms,
        _ => warn_invalid(key, value),
    }
}

/// Read a strictly-positive count field, keeping the default on absent or
/// invalid values.
fn read_count(obj: &serde_json::Map<String, Value>, key: &str, slot: &mut usize) {
    let Some(value) = obj.get(key) else { return };
    match value.as_u64() {
        Some(n) if n > 0 => *slot = n as usize,
        _ => warn_invalid(key, value),
    }
}

/// Read `<agent>Model` and `<agent>CliPath` for one agent.
fn read_agent(obj: &serde_json::Map<String, Value>, prefix: &str, slot: &mut AgentSettings) {
    let model_key = format!("{prefix}Model");
    if let Some(value) = obj.get(&model_key) {
        match value.as_str() {
            Some(model) if !model.trim().is_empty() => slot.model = Some(model.to_string()),
            _ => warn_invalid(&model_key, value),
        }
    }
    let path_key = format!("{prefix}CliPath");
    if let Some(value) = obj.get(&path_key) {
        match value.as_str() {
            Some(path) if !path.trim().is_empty() => slot.cli_path = path.to_string(),
            _ => warn_invalid(&path_key, value),
        }
    }
}

fn warn_invalid(key: &str, value: &Value) {
    tracing::warn!(key, value = %value, "invalid config value, using default");
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
