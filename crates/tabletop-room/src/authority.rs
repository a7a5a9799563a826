//! The membership authority: the only writer of room membership.
//!
//! Every change goes through here so that a session's `joined_rooms` and
//! the registry's member sets always describe the same thing:
//!
//! ```text
//! room ∈ session.joined_rooms  ⇔  session.connection_id ∈ registry.members(room)
//! ```

use tabletop_protocol::RoomKey;
use tabletop_session::Session;
use tabletop_transport::ConnectionId;

use crate::{Admission, JoinPolicy, LocalRoomRegistry, RoleLookup, RoomRegistry};

/// The result of a join attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinOutcome {
    /// The connection was added to the room.
    Joined,
    /// The connection was already a member. Nothing changed.
    AlreadyMember,
    /// Authorization failed. Nothing changed.
    Denied,
}

/// Applies joins, leaves and disconnects to a [`RoomRegistry`].
#[derive(Debug, Default)]
pub struct MembershipAuthority<R = LocalRoomRegistry> {
    registry: R,
}

impl<R: RoomRegistry> MembershipAuthority<R> {
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Authorizes and admits in one step.
    ///
    /// Holds `&mut self` across the role lookup. When the authority is
    /// shared behind a lock, call [`JoinPolicy::authorize`] first with no
    /// lock held, then [`admit`](Self::admit).
    pub async fn join<L: RoleLookup>(
        &mut self,
        policy: &JoinPolicy<L>,
        session: &mut Session,
        room: &RoomKey,
    ) -> JoinOutcome {
        let admission = policy.authorize(session.user_id(), room).await;
        self.admit(session, admission)
    }

    /// Applies the result of [`JoinPolicy::authorize`].
    ///
    /// `None`, or an admission issued to a different user, is a denial.
    pub fn admit(&mut self, session: &mut Session, admission: Option<Admission>) -> JoinOutcome {
        let conn = session.connection_id();
        let Some(admission) = admission.filter(|a| a.user() == session.user_id()) else {
            tracing::debug!(conn_id = %conn, user_id = %session.user_id(), "join denied");
            return JoinOutcome::Denied;
        };
        let room = admission.room();

        if session.is_in(room) {
            return JoinOutcome::AlreadyMember;
        }

        self.registry.add(room, conn);
        session.insert_room(room.clone());
        tracing::info!(
            conn_id = %conn,
            user_id = %session.user_id(),
            %room,
            "joined room"
        );
        JoinOutcome::Joined
    }

    /// Removes the session from `room`. Returns `false` if it wasn't in it.
    pub fn leave(&mut self, session: &mut Session, room: &RoomKey) -> bool {
        if !session.remove_room(room) {
            return false;
        }
        self.registry.remove(room, session.connection_id());
        tracing::info!(
            conn_id = %session.connection_id(),
            user_id = %session.user_id(),
            %room,
            "left room"
        );
        true
    }

    /// Removes the session from every room it is in. Returns those rooms.
    pub fn on_disconnect(&mut self, session: &mut Session) -> Vec<RoomKey> {
        let conn = session.connection_id();
        let rooms: Vec<RoomKey> = session.take_rooms().into_iter().collect();
        for room in &rooms {
            self.registry.remove(room, conn);
        }
        tracing::debug!(conn_id = %conn, rooms = rooms.len(), "connection left all rooms");
        rooms
    }

    pub fn members(&self, room: &RoomKey) -> Vec<ConnectionId> {
        self.registry.members(room)
    }

    pub fn is_member(&self, room: &RoomKey, conn: ConnectionId) -> bool {
        self.registry.contains(room, conn)
    }
}
