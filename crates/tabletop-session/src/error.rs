//! Error types for the session layer.

use tabletop_transport::ConnectionId;

/// Errors that can occur while authenticating or tracking sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The handshake carried no credential, or the credential was
    /// malformed, tampered with, or expired.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The authenticator could not be built, e.g. a signing secret that
    /// is too short.
    #[error("invalid authenticator configuration: {0}")]
    Config(String),

    /// Signing a new token failed.
    #[error("failed to issue token: {0}")]
    Issue(String),

    /// A session already exists for this connection.
    #[error("connection {0} already has a session")]
    AlreadyExists(ConnectionId),
}
