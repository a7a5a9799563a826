//! Reconnection supervisor.
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected
//!      ▲               │              │
//!      └── retry ◄─────┘ (failed)     │
//!      └──────────────────────────────┘ (lost)
//! ```
//!
//! Reaching `Connected` restores the transport only. Room membership is
//! not replayed here: the application re-joins (and refetches) when it
//! sees the state change.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use crate::ClientError;

/// Retry interval used when none is configured.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

/// The supervisor's connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Opens one connection attempt.
pub trait Connector: Send + Sync + 'static {
    type Connection: Send + 'static;

    fn connect(&self) -> impl Future<Output = Result<Self::Connection, ClientError>> + Send;
}

/// Keeps a connection up, retrying at a fixed interval.
#[derive(Debug)]
pub struct ReconnectionSupervisor<C> {
    connector: C,
    interval: Duration,
    state: watch::Sender<ConnectionState>,
}

impl<C: Connector> ReconnectionSupervisor<C> {
    pub fn new(connector: C, interval: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            interval,
            state,
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observes state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Makes a single connection attempt.
    pub async fn try_connect(&self) -> Result<C::Connection, ClientError> {
        self.set(ConnectionState::Connecting);
        match self.connector.connect().await {
            Ok(conn) => {
                self.set(ConnectionState::Connected);
                Ok(conn)
            }
            Err(e) => {
                self.set(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Attempts to connect until an attempt succeeds, sleeping `interval`
    /// between failed attempts.
    pub async fn connect(&self) -> C::Connection {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.try_connect().await {
                Ok(conn) => {
                    tracing::info!(attempt, "connected");
                    return conn;
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "connect attempt failed");
                    tokio::time::sleep(self.interval).await;
                }
            }
        }
    }

    /// Records that the transport went away.
    pub fn mark_lost(&self) {
        if self.state() != ConnectionState::Disconnected {
            tracing::info!("connection lost");
        }
        self.set(ConnectionState::Disconnected);
    }

    /// Supervises forever: connects, hands the connection to `session`
    /// until it returns (the transport was lost), waits one interval and
    /// starts over.
    pub async fn run<F, Fut>(&self, mut session: F)
    where
        F: FnMut(C::Connection) -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            let conn = self.connect().await;
            session(conn).await;
            self.mark_lost();
            tokio::time::sleep(self.interval).await;
        }
    }

    fn set(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }
}
