//! Frames exchanged over a sync connection.
//!
//! Every frame is a JSON object `{ "op": ..., "data": ... }`. Clients send
//! [`ClientFrame`]s; the server answers with [`ServerFrame`]s. Domain
//! events ride inside [`ServerFrame::Event`].

use serde::{Deserialize, Serialize};

use crate::{DomainEvent, MapId, RoomKey, UserId};

/// Frames a client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Asks to receive the events of `room`. A denied join gets no reply.
    Join { room: RoomKey },

    /// Stops receiving the events of `room`.
    Leave { room: RoomKey },

    /// A pointer ping on a map the session has already joined.
    Ping { map_id: MapId, x: f64, y: f64 },

    /// Keep-alive. Echoed back with the server's clock.
    Heartbeat { client_time: u64 },

    /// Graceful goodbye.
    Disconnect { reason: String },
}

/// Frames the server sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent once, after the handshake authenticated.
    Ready {
        connection_id: u64,
        user_id: UserId,
    },

    /// A domain event for one of the rooms this connection joined.
    Event(DomainEvent),

    /// Reply to [`ClientFrame::Heartbeat`].
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// A protocol-level failure. `401` precedes closing an
    /// unauthenticated connection.
    Error { code: u16, message: String },
}

impl ServerFrame {
    /// Builds an [`ServerFrame::Error`].
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}
