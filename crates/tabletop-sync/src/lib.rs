//! # tabletop-sync
//!
//! Real-time synchronization server for tabletop campaigns.
//!
//! Clients connect over a WebSocket, authenticate with the same token the
//! REST API issues, and join rooms (`user/<id>`, `campaign/<id>`,
//! `map/<id>`). Whoever commits a change publishes a
//! [`DomainEvent`](tabletop_protocol::DomainEvent) through a
//! [`Publisher`]; the server fans it out to every connection in the
//! event's rooms.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tabletop_sync::prelude::*;
//!
//! # async fn start() -> Result<(), SyncError> {
//! let config = ServerConfig::from_env();
//! tabletop_sync::init_tracing(&config.log_filter);
//!
//! let server = SyncServerBuilder::new()
//!     .config(config)
//!     .build_with_jwt(InMemoryRoles::new())
//!     .await?;
//!
//! let publisher = server.publisher();
//! // hand `publisher` to the REST layer, then:
//! server.run().await
//! # }
//! ```

#![allow(async_fn_in_trait)]

mod config;
mod error;
mod handler;
mod hub;
mod server;

pub use config::ServerConfig;
pub use error::SyncError;
pub use hub::Hub;
pub use server::{Publisher, SyncPublisher, SyncServer, SyncServerBuilder};

/// Installs a `tracing` subscriber that logs to stdout.
///
/// `RUST_LOG` wins over `default_filter` when set. Pass
/// [`ServerConfig::log_filter`] to honor `TABLETOP_LOG`. Calling this more
/// than once is harmless.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Everything needed to stand up a server and publish into it.
pub mod prelude {
    pub use crate::{
        Publisher, ServerConfig, SyncError, SyncPublisher, SyncServer, SyncServerBuilder,
    };
    pub use tabletop_protocol::{
        CampaignId, DomainEvent, EventType, MapId, RoomKey, RoomKind, UserId,
    };
    pub use tabletop_room::{InMemoryRoles, Role, RoleLookup, RolePolicy};
    pub use tabletop_session::{Authenticator, JwtAuthenticator};
}
