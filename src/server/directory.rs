//! Session directory
//!
//! The bounded table of live sessions, keyed by display name. Registration
//! enforces name validity, uniqueness, and the session cap in one critical
//! section; lookups hand out notify-writer clones and never perform I/O
//! while holding the lock. In the lock hierarchy this is level 1: nothing in
//! the registry or a room is touched while the directory lock is held.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::protocol::is_valid_username;
use crate::transport::NotifyWriter;
use crate::MAX_SESSIONS;

/// A registered session, as visible to other tasks.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// Display name, unique among live sessions.
    pub name: String,
    /// Identifier used for log correlation.
    pub session_id: Uuid,
    /// Producer endpoint of the session's notify channel.
    pub notify: NotifyWriter,
}

/// Why a registration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    /// Name is not 1-16 alphanumeric bytes.
    InvalidName,
    /// Another live session already holds the name.
    NameTaken,
    /// All session slots are occupied.
    Full,
}

/// Bounded table of live sessions keyed by display name.
pub struct SessionDirectory {
    capacity: usize,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionDirectory {
    /// Create a directory bounded to `capacity` sessions.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a directory with the default session cap.
    pub fn with_defaults() -> Self {
        Self::new(MAX_SESSIONS)
    }

    /// Register a new session under `name`.
    ///
    /// Validation, the uniqueness check, and the insert happen under one
    /// write-lock acquisition, so no interleaving can admit two sessions
    /// with the same name.
    pub async fn register(
        &self,
        name: &str,
        notify: NotifyWriter,
    ) -> Result<Uuid, RegisterError> {
        if !is_valid_username(name) {
            return Err(RegisterError::InvalidName);
        }

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(name) {
            return Err(RegisterError::NameTaken);
        }
        if sessions.len() >= self.capacity {
            return Err(RegisterError::Full);
        }

        let session_id = Uuid::new_v4();
        sessions.insert(
            name.to_string(),
            SessionEntry {
                name: name.to_string(),
                session_id,
                notify,
            },
        );
        Ok(session_id)
    }

    /// Look up a session's notify writer by name.
    pub async fn resolve(&self, name: &str) -> Option<NotifyWriter> {
        let sessions = self.sessions.read().await;
        sessions.get(name).map(|entry| entry.notify.clone())
    }

    /// Look up a full directory entry by name.
    pub async fn entry(&self, name: &str) -> Option<SessionEntry> {
        let sessions = self.sessions.read().await;
        sessions.get(name).cloned()
    }

    /// Release the slot held by `name`. Returns whether a slot was freed;
    /// a missing name is reported, never dereferenced.
    pub async fn deregister(&self, name: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(name).is_some()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
