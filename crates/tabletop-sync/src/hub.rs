//! The hub: sessions, room membership and outbound queues under one lock.
//!
//! Everything that must change together lives in one [`Hub`], and the
//! server keeps one hub behind one `tokio::sync::Mutex`. Code holding the
//! lock never awaits anything else, so membership changes and fan-out are
//! never interleaved.

use std::sync::Arc;

use tabletop_protocol::{DomainEvent, RoomKey, ServerFrame, UserId};
use tabletop_room::{
    Admission, BroadcastRouter, JoinOutcome, MembershipAuthority, OutboundReceiver,
    PublishReport,
};
use tabletop_session::{Session, SessionManager};
use tabletop_transport::ConnectionId;

use crate::SyncError;

/// Server-side state shared by every connection.
#[derive(Debug)]
pub struct Hub {
    sessions: SessionManager,
    authority: MembershipAuthority,
    router: BroadcastRouter,
}

impl Hub {
    pub fn new(outbound_capacity: usize) -> Self {
        Self {
            sessions: SessionManager::new(),
            authority: MembershipAuthority::default(),
            router: BroadcastRouter::new(outbound_capacity),
        }
    }

    /// Creates the session and outbound queue of an authenticated
    /// connection and queues its `Ready` frame.
    pub fn open(
        &mut self,
        conn: ConnectionId,
        user: UserId,
    ) -> Result<OutboundReceiver, SyncError> {
        self.sessions.create(conn, user.clone())?;
        let rx = self.router.register(conn);
        self.router.send_to(
            conn,
            Arc::new(ServerFrame::Ready {
                connection_id: conn.into_inner(),
                user_id: user,
            }),
        )?;
        Ok(rx)
    }

    /// Tears a connection down: leaves every room, closes the outbound
    /// queue, destroys the session. Safe to call twice.
    pub fn close(&mut self, conn: ConnectionId) -> Vec<RoomKey> {
        self.router.unregister(conn);
        match self.sessions.remove(conn) {
            Some(mut session) => self.authority.on_disconnect(&mut session),
            None => Vec::new(),
        }
    }

    pub fn join(&mut self, conn: ConnectionId, admission: Option<Admission>) -> JoinOutcome {
        let Some(session) = self.sessions.get_mut(conn) else {
            return JoinOutcome::Denied;
        };
        self.authority.admit(session, admission)
    }

    pub fn leave(&mut self, conn: ConnectionId, room: &RoomKey) -> bool {
        let Some(session) = self.sessions.get_mut(conn) else {
            return false;
        };
        self.authority.leave(session, room)
    }

    pub fn publish(&self, event: DomainEvent) -> PublishReport {
        self.router.publish(self.authority.registry(), event)
    }

    /// Queues a frame for one connection. Drops it when the queue is full.
    pub fn send_to(&self, conn: ConnectionId, frame: ServerFrame) -> Result<(), SyncError> {
        Ok(self.router.send_to(conn, Arc::new(frame))?)
    }

    pub fn session(&self, conn: ConnectionId) -> Option<&Session> {
        self.sessions.get(conn)
    }

    pub fn members(&self, room: &RoomKey) -> Vec<ConnectionId> {
        self.authority.members(room)
    }

    /// Number of live sessions.
    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }
}
