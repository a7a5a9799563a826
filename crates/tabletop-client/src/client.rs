//! The sync client: one WebSocket connection feeding one query cache.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tabletop_protocol::{ClientFrame, Codec, JsonCodec, MapId, RoomKey, ServerFrame, UserId};
use tabletop_transport::{Connection, WebSocketConnection};
use tokio::sync::{Mutex, watch};

use crate::supervisor::DEFAULT_RECONNECT_INTERVAL;
use crate::{
    CacheReconciler, ClientError, ConnectionState, Connector, Mutation, MutationCoordinator,
    QueryCache, QueryKey, Reconciliation, ReconnectionSupervisor,
};

/// Client connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// e.g. `ws://127.0.0.1:8080/socket`
    pub url: String,
    /// Session token, sent as a cookie with the upgrade request.
    pub credential: Option<String>,
    /// Must match the server's cookie name.
    pub cookie_name: String,
    pub reconnect_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/socket".to_string(),
            credential: None,
            cookie_name: "tabletop_session".to_string(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn credential(mut self, token: impl Into<String>) -> Self {
        self.credential = Some(token.into());
        self
    }

    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.credential
            .iter()
            .map(|token| ("Cookie".to_string(), format!("{}={token}", self.cookie_name)))
            .collect()
    }
}

/// Loads the authoritative state of one [`QueryKey`] from the REST API.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, key: &QueryKey) -> impl Future<Output = Result<Value, ClientError>> + Send;
}

/// An authenticated connection that has received its `Ready` frame.
pub struct Established {
    pub conn: WebSocketConnection,
    pub user_id: UserId,
    pub connection_id: u64,
}

/// Dials the sync server and waits for `Ready`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    config: ClientConfig,
}

impl WsConnector {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

impl Connector for WsConnector {
    type Connection = Established;

    async fn connect(&self) -> Result<Established, ClientError> {
        let conn = WebSocketConnection::connect(&self.config.url, &self.config.headers()).await?;
        let Some(data) = conn.recv().await? else {
            return Err(ClientError::Disconnected);
        };
        match JsonCodec.decode::<ServerFrame>(&data)? {
            ServerFrame::Ready {
                connection_id,
                user_id,
            } => Ok(Established {
                conn,
                user_id,
                connection_id,
            }),
            ServerFrame::Error { code: 401, message } => Err(ClientError::Unauthenticated(message)),
            other => Err(ClientError::UnexpectedFrame(format!("{other:?}"))),
        }
    }
}

/// Something the client received that the application may care about.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientUpdate {
    /// A domain event was applied to the cache.
    Reconciled(Reconciliation),
    HeartbeatAck { client_time: u64, server_time: u64 },
    Error { code: u16, message: String },
}

/// A live sync connection with its query cache.
///
/// The client remembers every room the application joined, with the keys
/// fetched alongside it, so [`rejoin`](Self::rejoin) can restore them
/// after a reconnect.
pub struct SyncClient<F> {
    supervisor: ReconnectionSupervisor<WsConnector>,
    established: Established,
    cache: Arc<Mutex<QueryCache>>,
    reconciler: CacheReconciler,
    coordinator: MutationCoordinator,
    fetcher: F,
    interests: Mutex<BTreeMap<RoomKey, Vec<QueryKey>>>,
}

impl<F: Fetcher> SyncClient<F> {
    /// Connects once. Fails if the server is unreachable or refuses the
    /// credential.
    pub async fn connect(config: ClientConfig, fetcher: F) -> Result<Self, ClientError> {
        let interval = config.reconnect_interval;
        let supervisor = ReconnectionSupervisor::new(WsConnector::new(config), interval);
        let established = supervisor.try_connect().await?;
        tracing::info!(
            user_id = %established.user_id,
            connection_id = established.connection_id,
            "sync client connected"
        );

        let cache = Arc::new(Mutex::new(QueryCache::new()));
        Ok(Self {
            reconciler: CacheReconciler::new(established.user_id.clone()),
            coordinator: MutationCoordinator::new(Arc::clone(&cache)),
            supervisor,
            established,
            cache,
            fetcher,
            interests: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn user_id(&self) -> &UserId {
        &self.established.user_id
    }

    /// The server's id for the current connection. Changes on reconnect.
    pub fn connection_id(&self) -> u64 {
        self.established.connection_id
    }

    pub fn cache(&self) -> Arc<Mutex<QueryCache>> {
        Arc::clone(&self.cache)
    }

    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.supervisor.subscribe()
    }

    /// Joins `room` and fetches `keys`, the cached queries that room's
    /// events keep current.
    pub async fn join(&self, room: RoomKey, keys: Vec<QueryKey>) -> Result<(), ClientError> {
        self.interests
            .lock()
            .await
            .insert(room.clone(), keys.clone());
        self.send(&ClientFrame::Join { room }).await?;
        self.refetch(&keys).await
    }

    pub async fn leave(&self, room: RoomKey) -> Result<(), ClientError> {
        self.interests.lock().await.remove(&room);
        self.send(&ClientFrame::Leave { room }).await
    }

    /// Rooms the application has asked to be in.
    pub async fn joined_rooms(&self) -> Vec<RoomKey> {
        self.interests.lock().await.keys().cloned().collect()
    }

    pub async fn ping(&self, map_id: MapId, x: f64, y: f64) -> Result<(), ClientError> {
        self.send(&ClientFrame::Ping { map_id, x, y }).await
    }

    /// Sends a heartbeat. The server drops connections that stay silent
    /// past its idle timeout, so listen-only clients call this on a timer.
    pub async fn heartbeat(&self) -> Result<u64, ClientError> {
        let client_time = unix_millis();
        self.send(&ClientFrame::Heartbeat { client_time }).await?;
        Ok(client_time)
    }

    /// Fetches `keys` and stores the results.
    pub async fn refetch(&self, keys: &[QueryKey]) -> Result<(), ClientError> {
        for key in keys {
            let data = self.fetcher.fetch(key).await?;
            self.cache.lock().await.store(key.clone(), data);
        }
        Ok(())
    }

    /// Runs an optimistic mutation against the cache.
    pub async fn mutate<E, R>(&self, mutation: Mutation<E>, remote: R) -> Result<Value, ClientError>
    where
        E: FnOnce(&Value) -> Value,
        R: Future<Output = Result<Value, ClientError>>,
    {
        self.coordinator.run(mutation, remote).await
    }

    /// Waits for the next frame from the server and applies it.
    ///
    /// Events are reconciled into the cache; rooms the reconciler reports
    /// as lost are left and invalidated keys are refetched before this
    /// returns. `None` means the connection closed and the state is now
    /// [`ConnectionState::Disconnected`]: call [`reconnect`](Self::reconnect).
    pub async fn next_update(&self) -> Result<Option<ClientUpdate>, ClientError> {
        loop {
            let data = match self.established.conn.recv().await {
                Ok(Some(data)) => data,
                Ok(None) => {
                    self.supervisor.mark_lost();
                    return Ok(None);
                }
                Err(e) => {
                    self.supervisor.mark_lost();
                    return Err(e.into());
                }
            };
            let frame: ServerFrame = match JsonCodec.decode(&data) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!(error = %e, "failed to decode server frame");
                    continue;
                }
            };

            match frame {
                ServerFrame::Event(event) => {
                    let reconciliation = {
                        let mut cache = self.cache.lock().await;
                        self.reconciler.apply(&mut cache, &event)
                    };
                    self.follow_up(&reconciliation).await?;
                    return Ok(Some(ClientUpdate::Reconciled(reconciliation)));
                }
                ServerFrame::HeartbeatAck {
                    client_time,
                    server_time,
                } => {
                    return Ok(Some(ClientUpdate::HeartbeatAck {
                        client_time,
                        server_time,
                    }));
                }
                ServerFrame::Error { code, message } => {
                    return Ok(Some(ClientUpdate::Error { code, message }));
                }
                ServerFrame::Ready { .. } => {
                    tracing::debug!("ignoring repeated ready frame");
                }
            }
        }
    }

    /// Re-establishes the transport, retrying at the configured interval.
    ///
    /// Rooms are not re-joined; call [`rejoin`](Self::rejoin) once the
    /// application is ready.
    pub async fn reconnect(&mut self) {
        self.supervisor.mark_lost();
        self.established = self.supervisor.connect().await;
        tracing::info!(
            connection_id = self.established.connection_id,
            "sync client reconnected"
        );
    }

    /// Re-joins every remembered room and refetches its keys.
    pub async fn rejoin(&self) -> Result<(), ClientError> {
        let interests: Vec<(RoomKey, Vec<QueryKey>)> = self
            .interests
            .lock()
            .await
            .iter()
            .map(|(room, keys)| (room.clone(), keys.clone()))
            .collect();
        for (room, keys) in interests {
            self.send(&ClientFrame::Join { room }).await?;
            self.refetch(&keys).await?;
        }
        Ok(())
    }

    /// Says goodbye and closes the socket.
    pub async fn disconnect(&self, reason: &str) -> Result<(), ClientError> {
        self.send(&ClientFrame::Disconnect {
            reason: reason.to_string(),
        })
        .await?;
        self.established.conn.close().await?;
        self.supervisor.mark_lost();
        Ok(())
    }

    async fn follow_up(&self, reconciliation: &Reconciliation) -> Result<(), ClientError> {
        for room in &reconciliation.leave_rooms {
            let joined = self.interests.lock().await.remove(room).is_some();
            if joined {
                self.send(&ClientFrame::Leave { room: room.clone() }).await?;
            }
        }
        for key in &reconciliation.invalidated {
            match self.fetcher.fetch(key).await {
                Ok(data) => self.cache.lock().await.store(key.clone(), data),
                // Stays stale; the next read retries.
                Err(e) => tracing::warn!(%key, error = %e, "refetch failed"),
            }
        }
        Ok(())
    }

    async fn send(&self, frame: &ClientFrame) -> Result<(), ClientError> {
        let bytes = JsonCodec.encode(frame)?;
        self.established.conn.send(&bytes).await?;
        Ok(())
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
