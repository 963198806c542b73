// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stderr line classification.
//!
//! The agent CLIs write operational noise to stderr. A small pattern
//! table picks out the lines worth surfacing to the user (rate limits,
//! upstream API failures, capacity); everything else goes only to the
//! debug log. The table is data, not code: callers may replace it
//! wholesale at driver construction since the pattern set is
//! agent-specific and evolves.

/// One classification rule: any needle matching (case-insensitive)
/// classifies the line under `summary`.
#[derive(Debug, Clone)]
pub struct StderrPattern {
    pub needles: Vec<String>,
    pub summary: String,
}

impl StderrPattern {
    pub fn new(needles: &[&str], summary: &str) -> Self {
        Self {
            needles: needles.iter().map(|n| n.to_string()).collect(),
            summary: summary.to_string(),
        }
    }
}

/// Ordered rule table; first match wins.
#[derive(Debug, Clone)]
pub struct StderrPatternTable {
    patterns: Vec<StderrPattern>,
}

impl Default for StderrPatternTable {
    fn default() -> Self {
        Self {
            patterns: vec![
                StderrPattern::new(
                    &["rate limit", "too many requests", "429"],
                    "limite de débit API / API rate limited",
                ),
                StderrPattern::new(
                    &["overloaded", "capacity", "at capacity"],
                    "service saturé / service at capacity",
                ),
                StderrPattern::new(
                    &["unauthorized", "invalid api key", "authentication"],
                    "authentification refusée / authentication failure",
                ),
                StderrPattern::new(
                    &["api error", "internal server error", "upstream error", "500"],
                    "erreur API amont / upstream API error",
                ),
                StderrPattern::new(
                    &["quota", "credit", "billing"],
                    "quota épuisé / quota exceeded",
                ),
            ],
        }
    }
}

impl StderrPatternTable {
    /// Build an empty table (nothing surfaced).
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Build a table from explicit rules.
    pub fn from_patterns(patterns: Vec<StderrPattern>) -> Self {
        Self { patterns }
    }

    /// Classify one stderr line.
    ///
    /// Returns the surfaced summary (`<label>: <line ≤120 chars>`) when a
    /// rule matches, `None` when the line is debug-only noise.
    pub fn match_line(&self, line: &str) -> Option<String> {
        let lower = line.to_lowercase();
        let rule = self
            .patterns
            .iter()
            .find(|p| p.needles.iter().any(|n| lower.contains(n.as_str())))?;
        let snippet: String = line.trim().chars().take(120).collect();
        Some(format!("{}: {}", rule.summary, snippet))
    }
}

#[cfg(test)]
#[path = "stderr_tests.rs"]
mod tests;
