//! Session registry implementation
//!
//! Sessions are shared by every connection task. The outer map lock is only
//! held for lookups and inserts; per-session work happens under the entry's
//! own lock, so independent keys never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::entry::{Session, SessionHandle, SessionSummary};
use crate::protocol::signal::DeviceInfo;
use crate::session::state::SessionPhase;

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new session was created
    Created,
    /// An existing session was overwritten (last write wins)
    Updated {
        /// Connection that owned the session before this upsert
        previous_owner: u64,
    },
}

/// Registry of live sessions keyed by session id
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a session
    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Create a session or overwrite an existing one's identity
    ///
    /// Existing sinks are kept; ownership moves to `owner`.
    pub async fn upsert(
        &self,
        id: &str,
        device: DeviceInfo,
        token: String,
        owner: u64,
    ) -> UpsertOutcome {
        let mut sessions = self.sessions.write().await;

        if let Some(entry_arc) = sessions.get(id) {
            let mut entry = entry_arc.write().await;
            let previous_owner = entry.owner;

            entry.device = device;
            entry.token = token;
            entry.owner = owner;
            entry.phase = SessionPhase::Connected;
            entry.touch();

            tracing::info!(
                session_id = %id,
                serial = %entry.device.serial,
                owner = owner,
                previous_owner = previous_owner,
                "Session updated"
            );

            UpsertOutcome::Updated { previous_owner }
        } else {
            tracing::info!(
                session_id = %id,
                serial = %device.serial,
                owner = owner,
                "Session created"
            );

            let entry = Session::new(id.to_string(), device, token, owner);
            sessions.insert(id.to_string(), Arc::new(RwLock::new(entry)));

            UpsertOutcome::Created
        }
    }

    /// Remove a session unconditionally
    ///
    /// Idempotent. Sinks of the returned entry are not closed here.
    pub async fn remove(&self, id: &str) -> Option<SessionHandle> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            tracing::debug!(session_id = %id, "Session removed");
        }
        removed
    }

    /// Remove a session only if `owner` still owns it
    ///
    /// A connection whose session was taken over by a newer connection gets
    /// `None` and must leave the entry alone.
    pub async fn release(&self, id: &str, owner: u64) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;

        let owned = match sessions.get(id) {
            Some(entry_arc) => entry_arc.read().await.owner == owner,
            None => return None,
        };

        if !owned {
            tracing::debug!(
                session_id = %id,
                connection = owner,
                "Session owned by another connection, not released"
            );
            return None;
        }

        tracing::debug!(session_id = %id, connection = owner, "Session released");
        sessions.remove(id)
    }

    /// Refresh a session's activity timestamp
    pub async fn touch(&self, id: &str) -> bool {
        match self.get(id).await {
            Some(entry) => {
                entry.write().await.touch();
                true
            }
            None => false,
        }
    }

    /// Record a state machine phase
    pub async fn set_phase(&self, id: &str, phase: SessionPhase) -> bool {
        match self.get(id).await {
            Some(entry) => {
                let mut entry = entry.write().await;
                entry.phase = phase;
                entry.touch();
                true
            }
            None => false,
        }
    }

    /// Snapshot of one session
    pub async fn summary(&self, id: &str) -> Option<SessionSummary> {
        let entry = self.get(id).await?;
        let entry = entry.read().await;
        Some(SessionSummary::from(&*entry))
    }

    /// Get total number of sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// All session ids
    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
