//! Per-connection handler: authentication, frame routing and cleanup.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Authenticate the upgrade request → get UserId (or 401 and close)
//!   2. Open the session and outbound queue → `Ready` is queued
//!   3. Spawn the writer task draining the outbound queue
//!   4. Loop: receive client frames → join / leave / ping / heartbeat
//!   5. On close: leave all rooms and destroy the session in one step

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde_json::json;
use tabletop_protocol::{
    ClientFrame, Codec, DomainEvent, EventType, MapId, RoomKey, ServerFrame, UserId,
};
use tabletop_room::{JoinOutcome, OutboundReceiver, RoleLookup};
use tabletop_session::Authenticator;
use tabletop_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::Mutex;

use crate::server::ServerState;
use crate::{Hub, SyncError};

/// Drop guard that tears the connection down if the handler unwinds
/// before its normal cleanup ran.
///
/// `Drop` is synchronous, so we spawn a fire-and-forget task for the
/// async lock.
struct ConnectionGuard {
    conn_id: ConnectionId,
    hub: Arc<Mutex<Hub>>,
    armed: bool,
}

impl ConnectionGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let conn_id = self.conn_id;
        let hub = Arc::clone(&self.hub);
        tokio::spawn(async move {
            hub.lock().await.close(conn_id);
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, L, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, L, C>>,
) -> Result<(), SyncError>
where
    A: Authenticator,
    L: RoleLookup,
    C: Codec,
{
    let conn_id = conn.id();
    let conn = Arc::new(conn);
    tracing::debug!(%conn_id, "handling new connection");

    // --- Step 1: Authenticate ---
    let user_id = match authenticate(&conn, &state).await {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::debug!(%conn_id, error = %e, "handshake rejected");
            let frame = ServerFrame::error(401, "unauthenticated");
            if let Ok(bytes) = state.codec.encode(&frame) {
                let _ = conn.send(&bytes).await;
            }
            let _ = conn.close().await;
            return Err(e);
        }
    };

    tracing::info!(%conn_id, %user_id, "user authenticated");

    // --- Step 2: Session + outbound queue ---
    let outbound = state.hub.lock().await.open(conn_id, user_id.clone())?;
    let mut guard = ConnectionGuard {
        conn_id,
        hub: Arc::clone(&state.hub),
        armed: true,
    };

    // --- Step 3: Writer ---
    let writer = tokio::spawn(write_frames(Arc::clone(&conn), outbound, Arc::clone(&state)));

    // --- Step 4: Frame loop ---
    let result = read_frames(&conn, &state, conn_id, &user_id).await;

    // --- Step 5: Cleanup ---
    let left = state.hub.lock().await.close(conn_id);
    guard.disarm();
    tracing::info!(%conn_id, %user_id, rooms = left.len(), "connection closed");

    writer.abort();
    let _ = conn.close().await;
    result
}

async fn authenticate<A, L, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, L, C>,
) -> Result<UserId, SyncError>
where
    A: Authenticator,
    L: RoleLookup,
    C: Codec,
{
    let attempt = state.auth.authenticate(conn.handshake());
    match tokio::time::timeout(state.config.handshake_timeout, attempt).await {
        Ok(Ok(user_id)) => Ok(user_id),
        Ok(Err(e)) => Err(SyncError::Session(e)),
        Err(_) => Err(SyncError::HandshakeTimeout),
    }
}

/// Drains the outbound queue into the socket until the queue closes or
/// the socket fails.
async fn write_frames<A, L, C: Codec>(
    conn: Arc<WebSocketConnection>,
    mut outbound: OutboundReceiver,
    state: Arc<ServerState<A, L, C>>,
) {
    let conn_id = conn.id();
    while let Some(frame) = outbound.recv().await {
        let bytes = match state.codec.encode(&*frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "failed to encode frame");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(%conn_id, error = %e, "socket write failed");
            break;
        }
    }
}

/// Reads and dispatches client frames until the connection closes, idles
/// out, or says goodbye.
async fn read_frames<A, L, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, L, C>,
    conn_id: ConnectionId,
    user_id: &UserId,
) -> Result<(), SyncError>
where
    A: Authenticator,
    L: RoleLookup,
    C: Codec,
{
    loop {
        let data = match tokio::time::timeout(state.config.idle_timeout, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::debug!(%conn_id, %user_id, "connection closed cleanly");
                return Ok(());
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, %user_id, error = %e, "recv error");
                return Err(e.into());
            }
            Err(_) => {
                tracing::info!(%conn_id, %user_id, "connection timed out");
                return Ok(());
            }
        };

        let frame: ClientFrame = match state.codec.decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode frame");
                continue;
            }
        };

        match frame {
            ClientFrame::Join { room } => {
                // Role lookup runs before the hub is locked.
                let admission = state.policy.authorize(user_id, &room).await;
                let outcome = state.hub.lock().await.join(conn_id, admission);
                if outcome == JoinOutcome::Denied {
                    tracing::debug!(%conn_id, %user_id, %room, "join denied");
                }
            }

            ClientFrame::Leave { room } => {
                state.hub.lock().await.leave(conn_id, &room);
            }

            ClientFrame::Ping { map_id, x, y } => {
                handle_ping(state, conn_id, user_id, map_id, x, y).await;
            }

            ClientFrame::Heartbeat { client_time } => {
                let ack = ServerFrame::HeartbeatAck {
                    client_time,
                    server_time: unix_millis(),
                };
                if let Err(e) = state.hub.lock().await.send_to(conn_id, ack) {
                    tracing::debug!(%conn_id, error = %e, "heartbeat ack dropped");
                }
            }

            ClientFrame::Disconnect { reason } => {
                tracing::info!(%conn_id, %user_id, %reason, "client disconnected");
                return Ok(());
            }
        }
    }
}

/// Broadcasts a pointer ping to a map room the session is already in.
async fn handle_ping<A, L, C>(
    state: &ServerState<A, L, C>,
    conn_id: ConnectionId,
    user_id: &UserId,
    map_id: MapId,
    x: f64,
    y: f64,
) {
    let room = RoomKey::map(&map_id);
    let hub = state.hub.lock().await;

    let is_member = hub.session(conn_id).is_some_and(|s| s.is_in(&room));
    if !is_member {
        tracing::warn!(%conn_id, %user_id, %room, "ping from non-member ignored");
        return;
    }

    let event = DomainEvent::new(
        EventType::MapPing,
        room,
        json!({
            "id": ping_id(),
            "mapId": map_id,
            "userId": user_id,
            "x": x,
            "y": y,
        }),
    );
    hub.publish(event);
}

/// A random 16-character hex id for a ping.
fn ping_id() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
