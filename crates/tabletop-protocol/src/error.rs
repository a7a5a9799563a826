//! Error types for the protocol layer.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, or an
    /// event type this build does not know.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A room key string did not name a known namespace and a non-empty id.
    #[error("invalid room key: {0:?}")]
    InvalidRoomKey(String),

    /// The message is invalid at the protocol level.
    ///
    /// For logical errors that pass deserialization but violate protocol
    /// rules, such as a first frame that is not expected at that point.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
