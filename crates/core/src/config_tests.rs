// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("config.json");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let config = UserConfig::load(&dir.path().join("absent.json")).unwrap();
    assert_eq!(config, UserConfig::default());
}

#[test]
fn valid_fields_override_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"{
            "execTimeoutMs": 30000,
            "maxRelaysPerWindow": 10,
            "leadModel": "opus",
            "workerBCliPath": "/usr/local/bin/codex"
        }"#,
    );
    let config = UserConfig::load(&path).unwrap();
    assert_eq!(config.exec_timeout_ms, 30_000);
    assert_eq!(config.max_relays_per_window, 10);
    assert_eq!(config.lead.model.as_deref(), Some("opus"));
    assert_eq!(config.worker_b.cli_path, "/usr/local/bin/codex");
    // Untouched fields keep their defaults
    assert_eq!(config.relay_window_ms, 60_000);
    assert_eq!(config.max_log_files, 20);
}

#[yare::parameterized(
    wrong_type  = { r#"{"execTimeoutMs": "fast"}"# },
    negative    = { r#"{"execTimeoutMs": -5}"# },
    zero        = { r#"{"execTimeoutMs": 0}"# },
    fractional  = { r#"{"execTimeoutMs": 1.5}"# },
)]
fn invalid_field_falls_back_to_default(body: &str) {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, body);
    let config = UserConfig::load(&path).unwrap();
    assert_eq!(config.exec_timeout_ms, 120_000);
}

#[test]
fn codex_timeout_zero_means_indefinite() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, r#"{"codexTimeoutMs": 0}"#);
    let config = UserConfig::load(&path).unwrap();
    assert_eq!(config.codex_timeout_ms, Some(0));
    assert_eq!(config.turn_timeout(AgentId::WorkerB), None);
    // Other agents keep the exec budget
    assert_eq!(
        config.turn_timeout(AgentId::Lead),
        Some(Duration::from_millis(120_000))
    );
}

#[test]
fn codex_timeout_override_applies_to_worker_b_only() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, r#"{"codexTimeoutMs": 240000}"#);
    let config = UserConfig::load(&path).unwrap();
    assert_eq!(
        config.turn_timeout(AgentId::WorkerB),
        Some(Duration::from_millis(240_000))
    );
    assert_eq!(
        config.turn_timeout(AgentId::WorkerA),
        Some(Duration::from_millis(120_000))
    );
}

#[yare::parameterized(
    array   = { "[1, 2, 3]" },
    string  = { "\"not an object\"" },
    garbage = { "{not json" },
)]
fn unusable_file_is_malformed(body: &str) {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, body);
    let err = UserConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Malformed(_)), "got: {:?}", err);
}

#[test]
fn empty_model_string_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, r#"{"leadModel": "  "}"#);
    let config = UserConfig::load(&path).unwrap();
    assert_eq!(config.lead.model, None);
}
