// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the orchestrator

use fedi_adapters::DriverError;
use fedi_core::SessionId;
use fedi_storage::SessionStoreError;
use thiserror::Error;

/// Errors that can occur while orchestrating a session
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("no active session")]
    NoActiveSession,
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
    #[error("session store error: {0}")]
    Store(#[from] SessionStoreError),
    #[error("unknown agent in user input: {0}")]
    UnknownAgent(String),
}
