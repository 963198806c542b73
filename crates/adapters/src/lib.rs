// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fedi-adapters: Drivers for the external agent CLIs.
//!
//! Each driver wraps one CLI binary, invoking it per turn with a prompt
//! and a resume handle, decoding its line-delimited JSON event stream,
//! and normalizing events into [`fedi_core::OutputLine`]s and status
//! transitions. The shared turn machinery (queueing, timeouts, stderr
//! surfacing) lives in one place; per-CLI knowledge is confined to a
//! [`driver::CliProfile`].

pub mod driver;
pub mod stream;

pub use driver::{
    AgentDriver, ClaudeDriver, CodexDriver, DriverConfig, DriverError, OutputHandler,
    StatusHandler, StderrPatternTable,
};
pub use stream::EventStreamDecoder;

#[cfg(any(test, feature = "test-support"))]
pub use driver::FakeDriver;
