//! Integration tests for the WebSocket transport.
//!
//! These tests spin up a real listener on an OS-assigned port and drive
//! it with both a raw `tokio-tungstenite` client and the transport's own
//! client-side [`WebSocketConnection::connect`].

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;

    use tabletop_transport::{
        Connection, PendingConnection, Transport, WebSocketConnection, WebSocketTransport,
    };
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    async fn bind() -> (WebSocketTransport, String) {
        let transport = WebSocketTransport::bind("127.0.0.1:0", "/socket")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr").to_string();
        (transport, addr)
    }

    async fn accept(transport: &mut WebSocketTransport) -> WebSocketConnection {
        let pending = transport.accept().await.expect("should accept");
        pending.upgrade().await.expect("should upgrade")
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (mut transport, addr) = bind().await;

        let server_handle = tokio::spawn(async move {
            accept(&mut transport).await
        });

        let (mut client_ws, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}/socket"))
                .await
                .expect("client should connect");

        let server_conn = server_handle.await.expect("task should complete");
        assert!(server_conn.id().into_inner() > 0);
        assert_eq!(server_conn.handshake().path(), "/socket");

        server_conn
            .send(b"hello from server")
            .await
            .expect("send should succeed");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"hello from server");

        client_ws
            .send(Message::Binary(b"hello from client".to_vec().into()))
            .await
            .unwrap();
        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, b"hello from client");

        server_conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_captures_handshake_headers() {
        let (mut transport, addr) = bind().await;

        let server_handle = tokio::spawn(async move {
            accept(&mut transport).await
        });

        let mut request = format!("ws://{addr}/socket")
            .into_client_request()
            .unwrap();
        request
            .headers_mut()
            .insert("cookie", "tabletop_session=abc; theme=dark".parse().unwrap());
        let (_client_ws, _) = tokio_tungstenite::connect_async(request)
            .await
            .expect("client should connect");

        let server_conn = server_handle.await.unwrap();
        assert_eq!(
            server_conn.handshake().cookie("tabletop_session"),
            Some("abc")
        );
    }

    #[tokio::test]
    async fn test_websocket_rejects_other_paths() {
        let (mut transport, addr) = bind().await;

        let server_handle = tokio::spawn(async move {
            let pending = transport.accept().await.expect("tcp accept");
            pending.upgrade().await
        });

        let client = tokio_tungstenite::connect_async(format!("ws://{addr}/elsewhere")).await;
        assert!(client.is_err(), "upgrade on a foreign path must fail");

        let accepted = server_handle.await.unwrap();
        assert!(accepted.is_err());
    }

    #[tokio::test]
    async fn test_client_connect_sends_headers() {
        let (mut transport, addr) = bind().await;

        let server_handle = tokio::spawn(async move {
            accept(&mut transport).await
        });

        let client = WebSocketConnection::connect(
            &format!("ws://{addr}/socket"),
            &[("Authorization".to_string(), "Bearer t0k3n".to_string())],
        )
        .await
        .expect("client should connect");
        assert_eq!(client.handshake().bearer_token(), Some("t0k3n"));

        let server_conn = server_handle.await.unwrap();
        assert_eq!(server_conn.handshake().bearer_token(), Some("t0k3n"));

        client.send(b"ping").await.unwrap();
        assert_eq!(server_conn.recv().await.unwrap().unwrap(), b"ping");

        server_conn.send(b"pong").await.unwrap();
        assert_eq!(client.recv().await.unwrap().unwrap(), b"pong");
    }

    #[tokio::test]
    async fn test_send_is_not_blocked_by_pending_recv() {
        let (mut transport, addr) = bind().await;

        let server_handle = tokio::spawn(async move {
            accept(&mut transport).await
        });
        let (mut client_ws, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}/socket"))
                .await
                .unwrap();
        let server_conn =
            std::sync::Arc::new(server_handle.await.unwrap());

        let reader = std::sync::Arc::clone(&server_conn);
        let pending = tokio::spawn(async move { reader.recv().await });

        // recv is parked on the read half; sending must still go through.
        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            server_conn.send(b"while reading"),
        )
        .await
        .expect("send must not wait on recv")
        .unwrap();
        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"while reading");

        client_ws.send(Message::Close(None)).await.unwrap();
        let result = pending.await.unwrap().expect("recv should not error");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (mut transport, addr) = bind().await;

        let server_handle = tokio::spawn(async move {
            accept(&mut transport).await
        });

        let (mut client_ws, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}/socket"))
                .await
                .unwrap();
        let server_conn = server_handle.await.unwrap();

        client_ws.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_stalled_peer_does_not_block_next_accept() {
        let (transport, addr) = bind().await;
        let mut transport = transport.with_upgrade_timeout(Duration::from_secs(30));

        // Connects but never sends an upgrade request.
        let _stalled = tokio::net::TcpStream::connect(addr.as_str()).await.unwrap();
        let stalled = transport.accept().await.expect("tcp accept");
        let stalled_upgrade = tokio::spawn(stalled.upgrade());

        let server_handle = tokio::spawn(async move { accept(&mut transport).await });
        let (_client_ws, _) = tokio::time::timeout(
            Duration::from_secs(2),
            tokio_tungstenite::connect_async(format!("ws://{addr}/socket")),
        )
        .await
        .expect("second peer must not wait on the stalled one")
        .expect("client should connect");

        let server_conn = server_handle.await.unwrap();
        assert_eq!(server_conn.handshake().path(), "/socket");
        assert!(!stalled_upgrade.is_finished());
        stalled_upgrade.abort();
    }

    #[tokio::test]
    async fn test_upgrade_times_out_for_silent_peer() {
        let (transport, addr) = bind().await;
        let mut transport = transport.with_upgrade_timeout(Duration::from_millis(100));

        let _stalled = tokio::net::TcpStream::connect(addr.as_str()).await.unwrap();
        let pending = transport.accept().await.expect("tcp accept");

        let result = pending.upgrade().await;
        assert!(result.is_err(), "silent peer must time out");
    }
}
