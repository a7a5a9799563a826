//! The server's record of one live connection.

use std::collections::BTreeSet;

use tabletop_protocol::{RoomKey, UserId};
use tabletop_transport::ConnectionId;

/// A live binding between one connection and one authenticated user.
///
/// Exactly one session exists per live connection; a user with several
/// tabs open has several sessions. `joined_rooms` mirrors the room
/// registry: a room key is in this set iff the connection is a member of
/// that room. The room layer is the only writer of the set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    connection_id: ConnectionId,
    user_id: UserId,
    joined_rooms: BTreeSet<RoomKey>,
}

impl Session {
    /// Creates a session that has joined no rooms.
    pub fn new(connection_id: ConnectionId, user_id: UserId) -> Self {
        Self {
            connection_id,
            user_id,
            joined_rooms: BTreeSet::new(),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// The rooms this connection currently belongs to.
    pub fn joined_rooms(&self) -> &BTreeSet<RoomKey> {
        &self.joined_rooms
    }

    pub fn is_in(&self, room: &RoomKey) -> bool {
        self.joined_rooms.contains(room)
    }

    /// Records a joined room. Returns `false` if it was already recorded.
    pub fn insert_room(&mut self, room: RoomKey) -> bool {
        self.joined_rooms.insert(room)
    }

    /// Forgets a room. Returns `false` if it was not recorded.
    pub fn remove_room(&mut self, room: &RoomKey) -> bool {
        self.joined_rooms.remove(room)
    }

    /// Empties the joined set, returning what it held.
    pub fn take_rooms(&mut self) -> BTreeSet<RoomKey> {
        std::mem::take(&mut self.joined_rooms)
    }
}
