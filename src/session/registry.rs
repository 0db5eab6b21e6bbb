//! Responder-side registry of active session IDs.
//!
//! The only mutable state shared across sessions on an endpoint. All
//! operations are O(1) under a single mutex with short critical sections;
//! the lock is never held across an await point.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::crypto::SessionId;

/// Set of session IDs currently in use on a responder.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: Mutex<HashSet<SessionId>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session ID.
    ///
    /// Returns `false` if the ID is already active.
    pub fn try_register(&self, id: SessionId) -> bool {
        self.inner
            .lock()
            .map(|mut set| set.insert(id))
            .unwrap_or(false)
    }

    /// Remove a session ID. Idempotent.
    pub fn deregister(&self, id: SessionId) {
        if let Ok(mut set) = self.inner.lock() {
            set.remove(&id);
        }
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|set| set.len()).unwrap_or(0)
    }

    /// Whether no sessions are active.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
