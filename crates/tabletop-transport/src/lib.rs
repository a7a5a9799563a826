//! Connection plumbing for tabletop sync.
//!
//! A client holds one long-lived, message-framed connection to the sync
//! server. This crate hides how that connection is carried behind
//! [`Transport`] (the listening side) and [`Connection`] (one socket), and
//! records the upgrade request as a [`Handshake`] so the session layer can
//! read the credential from it.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
mod handshake;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use handshake::Handshake;
#[cfg(feature = "websocket")]
pub use websocket::{PendingUpgrade, WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Server-assigned id of one live socket.
///
/// Sessions, room member sets and outbound queues are all keyed by it. A
/// user with two tabs open has two ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The listening side: hands out sockets that still have to upgrade.
///
/// [`accept`](Transport::accept) returns as soon as a peer connects. The
/// upgrade itself happens in [`PendingConnection::upgrade`], which the
/// caller runs on the peer's own task so a slow or silent peer never holds
/// up the next accept.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Pending: PendingConnection<Connection = Self::Connection, Error = Self::Error>;
    type Error: std::error::Error + Send + Sync;

    async fn accept(&mut self) -> Result<Self::Pending, Self::Error>;
}

/// A peer that connected but has not finished its upgrade.
pub trait PendingConnection: Send + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Completes the upgrade.
    ///
    /// Peers that ask for the wrong path or stall past the upgrade timeout
    /// surface as errors.
    async fn upgrade(self) -> Result<Self::Connection, Self::Error>;
}

/// One socket carrying whole frames in both directions.
///
/// Reads and writes lock independently: a task parked in
/// [`recv`](Connection::recv) never delays a [`send`](Connection::send)
/// from the connection's writer task.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// The next frame, or `Ok(None)` once the peer closed cleanly.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;

    /// The upgrade request this connection was opened with.
    fn handshake(&self) -> &Handshake;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_round_trips_raw_value() {
        assert_eq!(ConnectionId::new(42).into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display_is_prefixed() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_orders_by_value() {
        assert!(ConnectionId::new(1) < ConnectionId::new(2));
    }
}
