//! Unified error type for the sync server.

use tabletop_protocol::ProtocolError;
use tabletop_room::RoomError;
use tabletop_session::SessionError;
use tabletop_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (unauthenticated, duplicate session).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (role lookup, outbound queue).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The connection did not authenticate within the handshake timeout.
    #[error("handshake timed out")]
    HandshakeTimeout,
}
