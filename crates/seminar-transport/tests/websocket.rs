//! Integration tests for the WebSocket transport: a real server and a
//! real client, verifying frames actually cross the network.

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use seminar_transport::{Connection, Transport, WebSocketTransport};
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn connect_client(addr: &str) -> ClientWs {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        ws
    }

    /// Binds on an ephemeral port and returns the transport plus the
    /// address a client can dial.
    async fn bind_ephemeral() -> (WebSocketTransport, String) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr").to_string();
        (transport, addr)
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (mut transport, addr) = bind_ephemeral().await;

        let server_handle =
            tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.expect("task should complete");

        assert!(server_conn.id().into_inner() > 0);

        // Server sends, client receives — and the frame is text.
        server_conn
            .send(br#"{"type":"heartbeat-ack"}"#)
            .await
            .expect("send should succeed");

        let msg = client_ws.next().await.unwrap().unwrap();
        match msg {
            Message::Text(text) => {
                assert_eq!(text.as_str(), r#"{"type":"heartbeat-ack"}"#);
            }
            other => panic!("expected text frame, got {other:?}"),
        }

        // Client sends, server receives.
        client_ws
            .send(Message::Text(r#"{"type":"heartbeat"}"#.to_string().into()))
            .await
            .unwrap();

        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, br#"{"type":"heartbeat"}"#);

        server_conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_accepts_binary_frames_on_recv() {
        let (mut transport, addr) = bind_ephemeral().await;
        let server_handle =
            tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.unwrap();

        client_ws
            .send(Message::Binary(b"{\"type\":\"heartbeat\"}".to_vec().into()))
            .await
            .unwrap();

        let received = server_conn.recv().await.unwrap().unwrap();
        assert_eq!(received, b"{\"type\":\"heartbeat\"}");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (mut transport, addr) = bind_ephemeral().await;
        let server_handle =
            tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.unwrap();

        client_ws.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_websocket_send_while_recv_is_parked() {
        // The coordinator pushes broadcasts at connections that are idle
        // in recv(); the split halves must not deadlock each other.
        let (mut transport, addr) = bind_ephemeral().await;
        let server_handle =
            tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.unwrap();

        let recv_conn = server_conn.clone();
        let parked = tokio::spawn(async move { recv_conn.recv().await });

        // Give the recv task a moment to take the stream lock.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        server_conn.send(b"\"broadcast\"").await.expect("send must not block");

        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_text().unwrap().as_str(), "\"broadcast\"");

        // Unblock the parked recv and let the task finish.
        client_ws
            .send(Message::Text("\"reply\"".to_string().into()))
            .await
            .unwrap();
        let received = parked.await.unwrap().unwrap().unwrap();
        assert_eq!(received, b"\"reply\"");
    }
}
