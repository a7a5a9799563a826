//! Error types for the room layer.

use tabletop_transport::ConnectionId;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The role collaborator could not answer. The join is treated as
    /// denied.
    #[error("role lookup failed: {0}")]
    Lookup(String),

    /// No outbound queue is registered for the connection.
    #[error("connection {0} has no outbound queue")]
    UnknownConnection(ConnectionId),

    /// The connection's outbound queue is full; the frame was dropped.
    #[error("outbound queue of connection {0} is full")]
    QueueFull(ConnectionId),

    /// The connection's writer has gone away; the frame was dropped.
    #[error("outbound queue of connection {0} is closed")]
    QueueClosed(ConnectionId),
}
