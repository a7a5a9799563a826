//! The session manager: every live session, keyed by connection.
//!
//! # Concurrency note
//!
//! `SessionManager` is a plain `HashMap`, not a concurrent one. The server
//! keeps it inside the same locked hub as the room registry so that a
//! session's `joined_rooms` and the room member sets change together.

use std::collections::HashMap;

use tabletop_protocol::UserId;
use tabletop_transport::ConnectionId;

use crate::{Session, SessionError};

/// Registry of live sessions.
///
/// ```text
/// authenticate() ──→ create() ──→ (rooms joined / left) ──→ remove()
/// ```
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<ConnectionId, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the session for a freshly authenticated connection.
    ///
    /// # Errors
    /// [`SessionError::AlreadyExists`] if the connection already has one.
    pub fn create(
        &mut self,
        connection_id: ConnectionId,
        user_id: UserId,
    ) -> Result<&mut Session, SessionError> {
        if self.sessions.contains_key(&connection_id) {
            return Err(SessionError::AlreadyExists(connection_id));
        }

        tracing::info!(conn_id = %connection_id, %user_id, "session created");

        Ok(self
            .sessions
            .entry(connection_id)
            .or_insert_with(|| Session::new(connection_id, user_id)))
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&connection_id)
    }

    pub fn get_mut(&mut self, connection_id: ConnectionId) -> Option<&mut Session> {
        self.sessions.get_mut(&connection_id)
    }

    /// Destroys a session, returning it so the caller can clean up its rooms.
    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<Session> {
        let session = self.sessions.remove(&connection_id)?;
        tracing::info!(
            conn_id = %connection_id,
            user_id = %session.user_id(),
            "session destroyed"
        );
        Some(session)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Returns the number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionManager`.
    //!
    //! Naming: `test_{function}_{scenario}_{expected}`.

    use super::*;

    fn cid(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn uid(id: &str) -> UserId {
        UserId::new(id)
    }

    // =====================================================================
    // create()
    // =====================================================================

    #[test]
    fn test_create_new_connection_returns_empty_session() {
        let mut mgr = SessionManager::new();

        let session = mgr.create(cid(1), uid("alice")).expect("should succeed");

        assert_eq!(session.connection_id(), cid(1));
        assert_eq!(session.user_id(), &uid("alice"));
        assert!(session.joined_rooms().is_empty());
    }

    #[test]
    fn test_create_same_connection_twice_returns_error() {
        let mut mgr = SessionManager::new();
        mgr.create(cid(1), uid("alice")).unwrap();

        let result = mgr.create(cid(1), uid("alice"));

        assert!(matches!(result, Err(SessionError::AlreadyExists(c)) if c == cid(1)));
    }

    #[test]
    fn test_create_same_user_on_two_connections_is_allowed() {
        let mut mgr = SessionManager::new();
        mgr.create(cid(1), uid("alice")).unwrap();
        mgr.create(cid(2), uid("alice")).unwrap();

        assert_eq!(mgr.len(), 2);
        assert!(mgr.iter().all(|s| s.user_id() == &uid("alice")));
    }

    // =====================================================================
    // remove()
    // =====================================================================

    #[test]
    fn test_remove_returns_session_and_forgets_it() {
        let mut mgr = SessionManager::new();
        mgr.create(cid(1), uid("alice")).unwrap();

        let removed = mgr.remove(cid(1)).expect("session should exist");

        assert_eq!(removed.user_id(), &uid("alice"));
        assert!(mgr.get(cid(1)).is_none());
        assert!(mgr.is_empty());
    }

    #[test]
    fn test_remove_unknown_connection_returns_none() {
        let mut mgr = SessionManager::new();
        assert!(mgr.remove(cid(99)).is_none());
    }
}
