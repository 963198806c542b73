// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for time-window and debounce logic.
//!
//! Rate windows, correlation eviction, draft flushes, and the safety-net
//! debounce all measure elapsed monotonic time. Routing them through
//! `Clock` keeps that logic deterministic under test: production code
//! uses `SystemClock`, tests drive a `FakeClock` forward explicitly.

use std::time::{Duration, Instant};

/// Source of monotonic time.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Production clock backed by `Instant::now()`.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone)]
pub struct FakeClock {
    base: Instant,
    offset: std::sync::Arc<parking_lot::Mutex<Duration>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: std::sync::Arc::new(parking_lot::Mutex::new(Duration::ZERO)),
        }
    }

    /// Move the clock forward. Clones observe the advance.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock();
        *offset += by;
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
