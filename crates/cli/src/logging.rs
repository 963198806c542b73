// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rotating dual-format log sink.
//!
//! Every process start writes one pair of files under `~/.fedi/logs`: a
//! JSON-lines file for tooling and a human-readable file for eyeballs.
//! Startup prunes older pairs down to the configured retention. All
//! components log through `tracing`; nothing else touches these files.

use chrono::Utc;
use fedi_storage::prune_log_pairs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Derive the paired file names for a process starting now.
fn log_file_names(stamp: &str) -> (String, String) {
    (format!("fedi-{stamp}.jsonl"), format!("fedi-{stamp}.log"))
}

/// Install the global subscriber. The returned guards must live until
/// process exit or buffered lines are lost.
///
/// Fails (recoverably) when a global subscriber is already installed;
/// the caller downgrades that to a warning rather than dying.
pub fn init(logs_dir: &Path, max_log_files: usize) -> anyhow::Result<(WorkerGuard, WorkerGuard)> {
    std::fs::create_dir_all(logs_dir)?;

    // Keep room for the pair this process is about to create.
    prune_log_pairs(logs_dir, max_log_files.saturating_sub(1));

    let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string();
    let (json_name, plain_name) = log_file_names(&stamp);

    let json_appender = tracing_appender::rolling::never(logs_dir, json_name);
    let (json_writer, json_guard) = tracing_appender::non_blocking(json_appender);

    let plain_appender = tracing_appender::rolling::never(logs_dir, plain_name);
    let (plain_writer, plain_guard) = tracing_appender::non_blocking(plain_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(json_writer))
        .with(fmt::layer().with_ansi(false).with_writer(plain_writer))
        .try_init()
        .map_err(|e| anyhow::anyhow!("subscriber already installed: {e}"))?;

    Ok((json_guard, plain_guard))
}

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;
