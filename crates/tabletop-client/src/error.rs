//! Error types for the sync client.

use tabletop_protocol::ProtocolError;
use tabletop_transport::TransportError;

use crate::Notice;

/// Errors that can occur in the sync client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server refused the credential and closed the connection.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The server sent something other than what the client expected.
    #[error("unexpected frame: {0}")]
    UnexpectedFrame(String),

    /// A REST fetch failed.
    #[error("fetch of {key} failed: {message}")]
    Fetch { key: String, message: String },

    /// A remote mutation failed. The optimistic edit was rolled back.
    #[error("mutation failed: {0}")]
    MutationFailed(Notice),

    /// The connection is gone.
    #[error("disconnected")]
    Disconnected,
}
