//! Registry of live shell sessions.
//!
//! Every bridged session is registered for its lifetime so the daemon can
//! report what is running and close everything on shutdown.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use super::pty::{Session, SessionId};

/// Information about a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Unique session identifier.
    pub id: SessionId,
    /// Process ID of the shell.
    pub pid: Option<u32>,
    /// Current terminal columns.
    pub cols: u16,
    /// Current terminal rows.
    pub rows: u16,
    /// When the shell was started.
    pub started_at: DateTime<Utc>,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        let size = session.size();
        Self {
            id: session.id().clone(),
            pid: session.pid(),
            cols: size.cols,
            rows: size.rows,
            started_at: session.started_at(),
        }
    }
}

/// Thread-safe session registry using DashMap.
#[derive(Default)]
pub struct SessionRegistry {
    /// Map of session ID to session.
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a live session.
    pub fn register(&self, session: Arc<Session>) {
        let id = session.id().clone();
        self.sessions.insert(id.clone(), session);
        tracing::debug!(session_id = %id, active = self.sessions.len(), "Registered session");
    }

    /// Removes a session, returning it if it was registered.
    pub fn remove(&self, session_id: &SessionId) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(session_id).map(|(_, session)| session);
        if removed.is_some() {
            tracing::debug!(session_id = %session_id, active = self.sessions.len(), "Unregistered session");
        }
        removed
    }

    /// Gets information about a specific session.
    pub fn get(&self, session_id: &SessionId) -> Option<SessionInfo> {
        self.sessions
            .get(session_id)
            .map(|entry| SessionInfo::from(entry.value().as_ref()))
    }

    /// Lists all registered sessions, oldest first.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|entry| SessionInfo::from(entry.value().as_ref()))
            .collect();
        sessions.sort_by_key(|info| info.started_at);
        sessions
    }

    /// Returns the number of registered sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Closes and removes every registered session.
    pub async fn close_all(&self) {
        // Collect first: map guards must not be held across an await.
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();

        for id in ids {
            if let Some(session) = self.remove(&id) {
                if let Err(e) = session.close().await {
                    tracing::warn!(session_id = %id, error = %e, "Failed to close session");
                }
            }
        }
    }
}
