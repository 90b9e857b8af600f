//! Process-wide table of active relay sessions.
//!
//! The registry only answers "how many sessions are live". It never touches a
//! session's connections; closing them is the session's own job.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use uuid::Uuid;

/// Unique identity assigned to a session at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct SessionEntry {
    registered_at: Instant,
}

/// Thread-safe registry of active sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session. Re-registering an id refreshes its entry.
    pub fn register(&self, id: SessionId) {
        let active = {
            let mut sessions = self.sessions.lock();
            sessions.insert(
                id,
                SessionEntry {
                    registered_at: Instant::now(),
                },
            );
            sessions.len()
        };
        tracing::info!(session_id = %id, active, "Session registered");
    }

    /// Insert a session and return a guard that removes it on drop.
    pub fn register_scoped(self: &Arc<Self>, id: SessionId) -> Registration {
        self.register(id);
        Registration {
            registry: Arc::clone(self),
            id,
        }
    }

    /// Remove a session. Returns `false` if it was not registered.
    pub fn unregister(&self, id: SessionId) -> bool {
        let removed = self.sessions.lock().remove(&id);
        match removed {
            Some(entry) => {
                tracing::info!(
                    session_id = %id,
                    lifetime_ms = entry.registered_at.elapsed().as_millis() as u64,
                    "Session unregistered"
                );
                true
            }
            None => {
                tracing::debug!(session_id = %id, "Tried to unregister unknown session");
                false
            }
        }
    }

    /// Number of active sessions.
    pub fn count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.lock().contains_key(&id)
    }
}

/// Registry membership for one session; unregisters when dropped.
pub struct Registration {
    registry: Arc<SessionRegistry>,
    id: SessionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
