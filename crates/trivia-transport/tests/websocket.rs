//! Integration tests for the WebSocket transport over a real socket.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;
    use std::time::Duration;

    use trivia_transport::{
        Connection, Transport, WebSocketConnection, WebSocketTransport,
    };

    /// Binds on a random port and returns the transport with its URL.
    async fn bind() -> (WebSocketTransport, String) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("should have local addr");
        (transport, format!("ws://{addr}"))
    }

    /// Returns a connected (server side, client side) pair.
    async fn pair() -> (WebSocketConnection, WebSocketConnection) {
        let (mut transport, url) = bind().await;
        let server = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });
        let client = WebSocketConnection::connect(&url)
            .await
            .expect("client should connect");
        let server = server.await.expect("task should complete");
        (server, client)
    }

    #[tokio::test]
    async fn test_websocket_send_and_receive_both_ways() {
        let (server, client) = pair().await;
        assert_ne!(server.id(), client.id());

        server.send(b"hello from server").await.unwrap();
        let got = client.recv().await.unwrap().expect("should have data");
        assert_eq!(got, b"hello from server");

        client.send(b"hello from client").await.unwrap();
        let got = server.recv().await.unwrap().expect("should have data");
        assert_eq!(got, b"hello from client");
    }

    #[tokio::test]
    async fn test_websocket_binary_payload_survives() {
        let (server, client) = pair().await;

        server.send(&[0xff, 0x00, 0x80]).await.unwrap();
        let got = client.recv().await.unwrap().expect("should have data");
        assert_eq!(got, vec![0xff, 0x00, 0x80]);
    }

    #[tokio::test]
    async fn test_websocket_send_while_other_task_receives() {
        // The server side parks in recv() on one task and sends from
        // another; the split sink/stream must not deadlock.
        let (server, client) = pair().await;
        let server = Arc::new(server);

        let receiver = Arc::clone(&server);
        let waiting = tokio::spawn(async move { receiver.recv().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        tokio::time::timeout(Duration::from_secs(2), server.send(b"push"))
            .await
            .expect("send must not wait for recv")
            .unwrap();
        assert_eq!(client.recv().await.unwrap().unwrap(), b"push");

        client.send(b"reply").await.unwrap();
        let got = waiting.await.unwrap().unwrap().unwrap();
        assert_eq!(got, b"reply");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_peer_close() {
        let (server, client) = pair().await;

        client.close().await.expect("close should succeed");

        let result = server.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let (transport, url) = bind().await;
        drop(transport);

        let result = WebSocketConnection::connect(&url).await;
        assert!(result.is_err());
    }
}
