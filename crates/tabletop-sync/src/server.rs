//! `SyncServer` builder, accept loop and publisher handle.
//!
//! This ties the layers together: transport → protocol → session → room.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tabletop_protocol::{Codec, DomainEvent, JsonCodec};
use tabletop_room::{JoinPolicy, RoleLookup, RolePolicy};
use tabletop_session::{Authenticator, JwtAuthenticator};
use tabletop_transport::{PendingConnection, Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::{Hub, ServerConfig, SyncError};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<A, L, C> {
    pub(crate) hub: Arc<Mutex<Hub>>,
    pub(crate) auth: A,
    pub(crate) policy: JoinPolicy<L>,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
}

/// Publishes committed changes to the rooms in their scope.
///
/// Fire-and-forget: delivery is best effort and failures are not reported
/// back to the publisher.
pub trait Publisher: Send + Sync + 'static {
    fn publish(&self, event: DomainEvent) -> impl Future<Output = ()> + Send;
}

/// A cloneable [`Publisher`] bound to one running server.
///
/// Hand one to every REST handler or background job that mutates state.
#[derive(Clone)]
pub struct SyncPublisher {
    hub: Arc<Mutex<Hub>>,
}

impl Publisher for SyncPublisher {
    async fn publish(&self, event: DomainEvent) {
        let hub = self.hub.lock().await;
        hub.publish(event);
    }
}

/// Builder for configuring and starting a sync server.
///
/// ```rust,ignore
/// use tabletop_sync::prelude::*;
///
/// let server = SyncServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build_with_jwt(my_role_lookup)
///     .await?;
/// let publisher = server.publisher();
/// server.run().await
/// ```
#[derive(Debug, Default)]
pub struct SyncServerBuilder {
    config: ServerConfig,
    campaign_policy: RolePolicy,
}

impl SyncServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the path WebSocket upgrades are accepted on.
    pub fn socket_path(mut self, path: &str) -> Self {
        self.config.socket_path = path.to_string();
        self
    }

    pub fn idle_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.config.outbound_capacity = capacity;
        self
    }

    /// Who may join campaign rooms. Defaults to any member.
    pub fn campaign_policy(mut self, policy: RolePolicy) -> Self {
        self.campaign_policy = policy;
        self
    }

    /// Binds the listener and builds the server.
    pub async fn build<A, L>(
        self,
        auth: A,
        roles: L,
    ) -> Result<SyncServer<A, L, JsonCodec>, SyncError>
    where
        A: Authenticator,
        L: RoleLookup,
    {
        let transport =
            WebSocketTransport::bind(&self.config.bind_addr, &self.config.socket_path)
                .await?
                .with_upgrade_timeout(self.config.handshake_timeout);

        let state = Arc::new(ServerState {
            hub: Arc::new(Mutex::new(Hub::new(self.config.outbound_capacity))),
            auth,
            policy: JoinPolicy::with_campaign_policy(roles, self.campaign_policy),
            codec: JsonCodec,
            config: self.config,
        });

        Ok(SyncServer { transport, state })
    }

    /// Like [`build`](Self::build), authenticating with the configured JWT
    /// secret and cookie name.
    pub async fn build_with_jwt<L: RoleLookup>(
        self,
        roles: L,
    ) -> Result<SyncServer<JwtAuthenticator, L, JsonCodec>, SyncError> {
        if self.config.is_dev_jwt_secret() {
            tracing::warn!("using the development JWT secret");
        }
        let auth =
            JwtAuthenticator::with_cookie_name(&self.config.jwt_secret, &self.config.cookie_name)?;
        self.build(auth, roles).await
    }
}

/// A bound sync server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct SyncServer<A, L, C> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, L, C>>,
}

impl<A, L, C> SyncServer<A, L, C>
where
    A: Authenticator,
    L: RoleLookup,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle for publishing domain events into this server's rooms.
    pub fn publisher(&self) -> SyncPublisher {
        SyncPublisher {
            hub: Arc::clone(&self.state.hub),
        }
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(mut self) -> Result<(), SyncError> {
        tracing::info!(
            path = %self.state.config.socket_path,
            "sync server running"
        );

        loop {
            match self.transport.accept().await {
                Ok(pending) => {
                    let state = Arc::clone(&self.state);
                    // The upgrade runs on the peer's task so a stalled peer
                    // never delays the next accept.
                    tokio::spawn(async move {
                        let peer = pending.peer_addr();
                        let conn = match pending.upgrade().await {
                            Ok(conn) => conn,
                            Err(e) => {
                                tracing::debug!(%peer, error = %e, "upgrade failed");
                                return;
                            }
                        };
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::debug!(error = %e, "accept failed");
                }
            }
        }
    }
}
