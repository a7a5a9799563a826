//! # tabletop-client
//!
//! The client half of tabletop sync: a query cache kept current by the
//! server's domain events, optimistic mutations with exact rollback, and
//! a reconnection supervisor.
//!
//! - [`QueryCache`] holds API responses by [`QueryKey`].
//! - [`CacheReconciler`] applies events through one [`DispatchTable`].
//! - [`MutationCoordinator`] edits the cache before the server answers and
//!   restores it when the server says no.
//! - [`SyncClient`] wires them to a WebSocket connection.

mod cache;
mod client;
mod coordinator;
mod dispatch;
mod error;
mod reconciler;
mod supervisor;

pub use cache::{CacheEntry, QueryCache, QueryKey};
pub use client::{ClientConfig, ClientUpdate, Established, Fetcher, SyncClient, WsConnector};
pub use coordinator::{Mutation, MutationCoordinator, Notice, Snapshot};
pub use dispatch::{DispatchTable, ListOp, Rule, Strategy};
pub use error::ClientError;
pub use reconciler::{CacheReconciler, Reconciliation};
pub use supervisor::{
    ConnectionState, Connector, DEFAULT_RECONNECT_INTERVAL, ReconnectionSupervisor,
};
