//! Room member sets.

use std::collections::{HashMap, HashSet};

use tabletop_protocol::RoomKey;
use tabletop_transport::ConnectionId;

/// Where room member sets live.
///
/// Rooms exist only while they have members: adding to an unknown room
/// creates it, removing the last member deletes it. A shared store for
/// multi-process deployments would implement this trait.
pub trait RoomRegistry: Send + 'static {
    /// Adds `conn` to `room`. Returns `false` if it was already a member.
    fn add(&mut self, room: &RoomKey, conn: ConnectionId) -> bool;

    /// Removes `conn` from `room`. Returns `false` if it was not a member.
    fn remove(&mut self, room: &RoomKey, conn: ConnectionId) -> bool;

    fn contains(&self, room: &RoomKey, conn: ConnectionId) -> bool;

    /// Current members of `room`; empty for rooms that don't exist.
    fn members(&self, room: &RoomKey) -> Vec<ConnectionId>;

    /// Every room that currently has members.
    fn rooms(&self) -> Vec<RoomKey>;
}

/// In-process [`RoomRegistry`].
#[derive(Debug, Default)]
pub struct LocalRoomRegistry {
    rooms: HashMap<RoomKey, HashSet<ConnectionId>>,
}

impl LocalRoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl RoomRegistry for LocalRoomRegistry {
    fn add(&mut self, room: &RoomKey, conn: ConnectionId) -> bool {
        self.rooms.entry(room.clone()).or_default().insert(conn)
    }

    fn remove(&mut self, room: &RoomKey, conn: ConnectionId) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&conn);
        if members.is_empty() {
            self.rooms.remove(room);
            tracing::debug!(%room, "room emptied");
        }
        removed
    }

    fn contains(&self, room: &RoomKey, conn: ConnectionId) -> bool {
        self.rooms.get(room).is_some_and(|m| m.contains(&conn))
    }

    fn members(&self, room: &RoomKey) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    fn rooms(&self) -> Vec<RoomKey> {
        self.rooms.keys().cloned().collect()
    }
}
