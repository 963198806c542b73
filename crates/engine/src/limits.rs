// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relay window and correlation-depth bookkeeping.
//!
//! Two small counters keep relay storms in check: a sliding-window rate
//! limiter over all relays, and a per-correlation table whose counts the
//! bus checks against the depth cutoff. Both measure time through the
//! core [`Clock`] so tests can drive them deterministically.

use fedi_core::{Clock, CorrelationId};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Correlation entries idle this long are eviction candidates.
const CORRELATION_IDLE: Duration = Duration::from_secs(600);

/// Sliding-window relay rate limiter.
#[derive(Debug)]
pub struct RelayRateLimiter<C: Clock> {
    window: Duration,
    max: usize,
    stamps: VecDeque<Instant>,
    clock: C,
}

impl<C: Clock> RelayRateLimiter<C> {
    pub fn new(max: usize, window: Duration, clock: C) -> Self {
        Self {
            window,
            max,
            stamps: VecDeque::new(),
            clock,
        }
    }

    /// Admit one relay now. Returns false when the window is full.
    pub fn allow(&mut self) -> bool {
        let now = self.clock.now();
        while let Some(front) = self.stamps.front() {
            if now.duration_since(*front) >= self.window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
        if self.stamps.len() >= self.max {
            return false;
        }
        self.stamps.push_back(now);
        true
    }

    /// Relays admitted in the current window.
    pub fn in_window(&self) -> usize {
        self.stamps.len()
    }
}

/// Per-correlation message counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationCounter {
    pub count: u32,
    pub last_seen_at: Instant,
}

/// Bounded map of correlation counters.
///
/// Exceeding the cap first drops entries idle for ten minutes, then the
/// least recently seen, so a long session cannot grow the map without
/// bound.
#[derive(Debug)]
pub struct CorrelationTable {
    entries: HashMap<CorrelationId, CorrelationCounter>,
    cap: usize,
}

impl CorrelationTable {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: HashMap::new(),
            cap,
        }
    }

    /// Messages seen so far for this correlation.
    pub fn count(&self, id: &CorrelationId) -> u32 {
        self.entries.get(id).map(|c| c.count).unwrap_or(0)
    }

    /// Record `by` more messages for this correlation.
    pub fn bump(&mut self, id: &CorrelationId, by: u32, now: Instant) {
        let entry = self
            .entries
            .entry(id.clone())
            .or_insert(CorrelationCounter {
                count: 0,
                last_seen_at: now,
            });
        entry.count += by;
        entry.last_seen_at = now;
        self.evict(now);
    }

    /// Number of tracked correlations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Shrink back under the cap: stale first, then LRU.
    fn evict(&mut self, now: Instant) {
        if self.entries.len() <= self.cap {
            return;
        }
        self.entries
            .retain(|_, c| now.duration_since(c.last_seen_at) < CORRELATION_IDLE);

        while self.entries.len() > self.cap {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, c)| c.last_seen_at)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }
}

#[cfg(test)]
#[path = "limits_tests.rs"]
mod tests;
