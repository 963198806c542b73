// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup pruning for the rotating log sink.
//!
//! Each process start writes one `fedi-<iso-timestamp>.jsonl` /
//! `fedi-<iso-timestamp>.log` pair. Timestamps sort lexicographically, so
//! retention is a name sort. Best-effort: removal failures are logged and
//! skipped so startup never blocks on housekeeping.

use std::collections::BTreeSet;
use std::path::Path;

const LOG_PREFIX: &str = "fedi-";

/// Delete older log pairs, keeping the `keep` most recent.
///
/// Returns the number of files removed. A missing directory is fine.
pub fn prune_log_pairs(logs_dir: &Path, keep: usize) -> usize {
    let entries = match std::fs::read_dir(logs_dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    // Collect distinct pair stems: "fedi-<iso-timestamp>"
    let mut stems: BTreeSet<String> = BTreeSet::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(LOG_PREFIX) {
            continue;
        }
        if let Some(stem) = name
            .strip_suffix(".jsonl")
            .or_else(|| name.strip_suffix(".log"))
        {
            stems.insert(stem.to_string());
        }
    }

    if stems.len() <= keep {
        return 0;
    }

    // BTreeSet iterates ascending; older timestamps come first.
    let excess = stems.len() - keep;
    let mut removed = 0;
    for stem in stems.iter().take(excess) {
        for ext in ["jsonl", "log"] {
            let path = logs_dir.join(format!("{stem}.{ext}"));
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to prune log file");
                }
            }
        }
    }
    removed
}

#[cfg(test)]
#[path = "log_prune_tests.rs"]
mod tests;
