// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Debounced session persistence.
//!
//! File layout: `<project_dir>/sessions/session-<id>.json`, one
//! pretty-printed [`SessionData`] per file. `schedule_save` coalesces
//! bursts of mutations into a single write after the throttle elapses;
//! `finalize` stamps `finished_at` and flushes synchronously.
//!
//! Writes are atomic: serialize to `.tmp`, then rename over the final
//! path, so a crash mid-write never leaves a torn session file.

use crate::session::{SessionData, SessionSummary, SESSION_VERSION};
use chrono::Utc;
use fedi_core::{AgentId, Message, SessionId};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from session persistence.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no active session")]
    NoSession,
}

struct StoreInner {
    session: Option<SessionData>,
    dirty: bool,
    save_scheduled: bool,
}

/// Directory-scoped store owning the in-memory session record.
///
/// All mutation goes through this type; external readers get snapshots.
#[derive(Clone)]
pub struct SessionStore {
    project_dir: PathBuf,
    throttle: Duration,
    inner: Arc<Mutex<StoreInner>>,
}

impl SessionStore {
    /// Create a store bound to `project_dir` with the given save debounce.
    pub fn new(project_dir: PathBuf, throttle: Duration) -> Self {
        Self {
            project_dir,
            throttle,
            inner: Arc::new(Mutex::new(StoreInner {
                session: None,
                dirty: false,
                save_scheduled: false,
            })),
        }
    }

    /// Begin a fresh session for `task`; returns its id.
    pub fn create(&self, id: SessionId, task: &str) -> SessionId {
        let session = SessionData::new(id.clone(), task, self.project_dir.clone());
        {
            let mut inner = self.inner.lock();
            inner.session = Some(session);
            inner.dirty = true;
        }
        self.schedule_save();
        id
    }

    /// Adopt a previously loaded session (resume path).
    pub fn adopt(&self, mut session: SessionData) {
        session.finished_at = None;
        let mut inner = self.inner.lock();
        inner.session = Some(session);
        inner.dirty = true;
    }

    /// Append one message to the active session.
    pub fn append_message(&self, message: Message) {
        {
            let mut inner = self.inner.lock();
            let Some(session) = inner.session.as_mut() else {
                tracing::warn!("append_message with no active session");
                return;
            };
            session.messages.push(message);
            inner.dirty = true;
        }
        self.schedule_save();
    }

    /// Record the external session id an agent's CLI handed back.
    pub fn set_agent_session(&self, agent: AgentId, external_id: String) {
        {
            let mut inner = self.inner.lock();
            let Some(session) = inner.session.as_mut() else {
                tracing::warn!(%agent, "set_agent_session with no active session");
                return;
            };
            session.agent_sessions.insert(agent, external_id);
            inner.dirty = true;
        }
        self.schedule_save();
    }

    /// Immutable snapshot of the active session.
    pub fn snapshot(&self) -> Option<SessionData> {
        self.inner.lock().session.clone()
    }

    /// Coalesce mutations into one disk write after the throttle.
    ///
    /// Failures are logged and retried on the next schedule; persistence
    /// problems never take the orchestration down.
    pub fn schedule_save(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.save_scheduled || !inner.dirty {
                return;
            }
            inner.save_scheduled = true;
        }
        let store = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(store.throttle).await;
            if let Err(e) = store.flush() {
                tracing::warn!(error = %e, "session save failed, will retry on next change");
                let mut inner = store.inner.lock();
                inner.save_scheduled = false;
                // dirty stays set so the next mutation reschedules
                return;
            }
            let mut inner = store.inner.lock();
            inner.save_scheduled = false;
        });
    }

    /// Stamp `finished_at` and write synchronously.
    pub fn finalize(&self) -> Result<(), SessionStoreError> {
        {
            let mut inner = self.inner.lock();
            let session = inner.session.as_mut().ok_or(SessionStoreError::NoSession)?;
            if session.finished_at.is_none() {
                session.finished_at = Some(Utc::now());
            }
            inner.dirty = true;
        }
        self.flush()
    }

    /// Write the current session to disk if dirty.
    pub fn flush(&self) -> Result<(), SessionStoreError> {
        let (session, was_dirty) = {
            let mut inner = self.inner.lock();
            let Some(session) = inner.session.clone() else {
                return Ok(());
            };
            let was_dirty = inner.dirty;
            inner.dirty = false;
            (session, was_dirty)
        };
        if !was_dirty {
            return Ok(());
        }
        if let Err(e) = write_session(&self.project_dir, &session) {
            // Mark dirty again so a later schedule retries
            self.inner.lock().dirty = true;
            return Err(e);
        }
        tracing::debug!(session_id = %session.id, "session saved");
        Ok(())
    }

    /// Path of the active session file, if a session exists.
    pub fn session_path(&self) -> Option<PathBuf> {
        let inner = self.inner.lock();
        inner
            .session
            .as_ref()
            .map(|s| session_file(&self.project_dir, &s.id))
    }
}

/// The sessions directory under a project.
fn sessions_dir(project_dir: &Path) -> PathBuf {
    project_dir.join("sessions")
}

fn session_file(project_dir: &Path, id: &SessionId) -> PathBuf {
    sessions_dir(project_dir).join(format!("session-{}.json", id))
}

/// Serialize and atomically replace one session file.
fn write_session(project_dir: &Path, session: &SessionData) -> Result<(), SessionStoreError> {
    let path = session_file(project_dir, &session.id);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(session)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// Load one session by id.
///
/// Returns `Ok(None)` for missing files, version mismatches, and corrupt
/// JSON (the latter two with a logged warning).
pub fn load_session(
    project_dir: &Path,
    id: &SessionId,
) -> Result<Option<SessionData>, SessionStoreError> {
    let path = session_file(project_dir, id);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SessionStoreError::Io(e)),
    };
    match serde_json::from_str::<SessionData>(&raw) {
        Ok(session) if session.version == SESSION_VERSION => Ok(Some(session)),
        Ok(session) => {
            tracing::warn!(
                path = %path.display(),
                version = session.version,
                "session version mismatch, skipping"
            );
            Ok(None)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt session file, skipping");
            Ok(None)
        }
    }
}

/// List stored sessions, newest first.
///
/// Files with a version mismatch or corrupt JSON are skipped with a
/// warning; a missing sessions directory yields an empty list.
pub fn list_sessions(project_dir: &Path) -> Vec<SessionSummary> {
    let dir = sessions_dir(project_dir);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut summaries: Vec<SessionSummary> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            name.starts_with("session-") && name.ends_with(".json")
        })
        .filter_map(|e| {
            let raw = std::fs::read_to_string(e.path()).ok()?;
            match serde_json::from_str::<SessionData>(&raw) {
                Ok(session) if session.version == SESSION_VERSION => Some(SessionSummary {
                    id: session.id,
                    task: session.task,
                    started_at: session.started_at,
                    finished_at: session.finished_at,
                }),
                Ok(session) => {
                    tracing::warn!(
                        path = %e.path().display(),
                        version = session.version,
                        "session version mismatch, skipping"
                    );
                    None
                }
                Err(err) => {
                    tracing::warn!(
                        path = %e.path().display(),
                        error = %err,
                        "corrupt session file, skipping"
                    );
                    None
                }
            }
        })
        .collect();

    summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    summaries
}

#[cfg(test)]
#[path = "session_store_tests.rs"]
mod tests;
