//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{
    Connection, ConnectionId, Handshake, PendingConnection, Transport, TransportError,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

const DEFAULT_UPGRADE_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn next_connection_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// A WebSocket-based [`Transport`] that accepts upgrades on one fixed path.
///
/// Upgrade requests for any other path are answered with `404` and never
/// become connections. A peer that doesn't finish the upgrade within the
/// upgrade timeout is dropped when its [`PendingUpgrade`] is driven.
pub struct WebSocketTransport {
    listener: TcpListener,
    path: String,
    upgrade_timeout: Duration,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address, accepting
    /// upgrades only on `path`.
    pub async fn bind(addr: &str, path: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, path, "WebSocket transport listening");
        Ok(Self {
            listener,
            path: path.to_string(),
            upgrade_timeout: DEFAULT_UPGRADE_TIMEOUT,
        })
    }

    /// Sets how long a peer may take to complete the upgrade.
    pub fn with_upgrade_timeout(mut self, timeout: Duration) -> Self {
        self.upgrade_timeout = timeout;
        self
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The path upgrades are accepted on.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Pending = PendingUpgrade;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<PendingUpgrade, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::trace!(%addr, "tcp peer connected");

        Ok(PendingUpgrade {
            stream,
            addr,
            path: self.path.clone(),
            timeout: self.upgrade_timeout,
        })
    }
}

/// A TCP peer that has not sent its upgrade request yet.
pub struct PendingUpgrade {
    stream: TcpStream,
    addr: SocketAddr,
    path: String,
    timeout: Duration,
}

impl PendingUpgrade {
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl PendingConnection for PendingUpgrade {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn upgrade(self) -> Result<WebSocketConnection, TransportError> {
        let Self {
            stream,
            addr,
            path,
            timeout,
        } = self;

        let mut captured: Option<Handshake> = None;
        let callback = |req: &Request, resp: Response| {
            if req.uri().path() != path {
                let mut err = ErrorResponse::new(Some("not found".into()));
                *err.status_mut() = StatusCode::NOT_FOUND;
                return Err(err);
            }
            captured = Some(handshake_from_request(req));
            Ok(resp)
        };

        let upgrade = tokio_tungstenite::accept_hdr_async(
            MaybeTlsStream::Plain(stream),
            callback,
        );
        let ws = tokio::time::timeout(timeout, upgrade)
            .await
            .map_err(|_| TransportError::HandshakeRejected("upgrade timed out".into()))?
            .map_err(|e| TransportError::HandshakeRejected(e.to_string()))?;

        let handshake = captured.ok_or_else(|| {
            TransportError::HandshakeRejected("no upgrade request".into())
        })?;

        let id = next_connection_id();
        tracing::debug!(%id, %addr, path = handshake.path(), "accepted WebSocket connection");

        Ok(WebSocketConnection::from_stream(id, handshake, ws))
    }
}

fn handshake_from_request(req: &Request) -> Handshake {
    let mut handshake = Handshake::new(req.uri().path());
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            handshake.insert_header(name.as_str(), value.to_string());
        }
    }
    handshake
}

/// A single WebSocket connection, server- or client-side.
///
/// The stream is split so the read half and the write half lock
/// independently.
pub struct WebSocketConnection {
    id: ConnectionId,
    handshake: Handshake,
    writer: Mutex<SplitSink<WsStream, Message>>,
    reader: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    fn from_stream(id: ConnectionId, handshake: Handshake, ws: WsStream) -> Self {
        let (writer, reader) = ws.split();
        Self {
            id,
            handshake,
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        }
    }

    /// Dials `url` (e.g. `ws://127.0.0.1:8080/socket`) sending the given
    /// extra headers with the upgrade request.
    pub async fn connect(
        url: &str,
        headers: &[(String, String)],
    ) -> Result<Self, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let mut handshake = Handshake::new(request.uri().path());
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
            request.headers_mut().append(header_name, header_value);
            handshake.insert_header(name, value.clone());
        }

        let (ws, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let id = next_connection_id();
        tracing::debug!(%id, url, "opened WebSocket connection");
        Ok(Self::from_stream(id, handshake, ws))
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = Message::Binary(data.to_vec().into());
        self.writer.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut reader = self.reader.lock().await;
        loop {
            match reader.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.writer.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn handshake(&self) -> &Handshake {
        &self.handshake
    }
}
