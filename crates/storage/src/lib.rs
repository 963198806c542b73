// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fedi-storage: Durable session records and log-file housekeeping.
//!
//! One orchestration run owns one [`SessionStore`], bound to a project
//! directory. Mutations are coalesced into debounced disk writes;
//! `finalize` flushes synchronously on shutdown. The rotating log sink's
//! pruning lives here too, so no other crate does log-file I/O.

pub mod log_prune;
pub mod session;
pub mod session_store;

pub use log_prune::prune_log_pairs;
pub use session::{SessionData, SessionSummary, SESSION_VERSION};
pub use session_store::{list_sessions, load_session, SessionStore, SessionStoreError};
