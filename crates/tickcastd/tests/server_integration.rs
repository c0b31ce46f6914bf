//! Integration tests for the WebSocket server.
//!
//! These tests run a real `DaemonServer` on an ephemeral port and talk to
//! it with real WebSocket connections, covering the upgrade, the command
//! set, broadcasts, and graceful shutdown.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tickcast_protocol::{Command, ResponseFrame};
use tickcastd::config::{HubConfig, ServerConfig};
use tickcastd::hub::spawn_hub;
use tickcastd::server::DaemonServer;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on any single wait for a frame
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Test Helpers
// ============================================================================

/// Test server context that manages server lifecycle.
struct TestServer {
    url: String,
    base: String,
    cancel_token: CancellationToken,
}

impl TestServer {
    /// Spawns a server whose timer effectively never fires.
    async fn spawn() -> Self {
        Self::spawn_with_period(3_600_000).await
    }

    async fn spawn_with_period(broadcast_period_ms: u64) -> Self {
        let cancel_token = CancellationToken::new();
        let hub_config = HubConfig {
            broadcast_period_ms,
            ..HubConfig::default()
        };
        let hub = spawn_hub(&hub_config, cancel_token.clone());

        let server_config = ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        };
        let server = DaemonServer::bind(&server_config, hub, cancel_token.clone())
            .await
            .expect("bind server");
        let url = server.url();
        let base = format!("ws://{}", server.local_addr());

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        Self {
            url,
            base,
            cancel_token,
        }
    }

    async fn connect(&self) -> TestClient {
        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .expect("connect to server");
        TestClient { ws }
    }

    fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

/// Test client connection with protocol helpers.
struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    async fn send_command(&mut self, command: Command) {
        let frame = command.encode().unwrap();
        self.ws.send(Message::Binary(frame)).await.unwrap();
    }

    async fn send_raw(&mut self, frame: &[u8]) {
        self.ws.send(Message::Binary(frame.to_vec())).await.unwrap();
    }

    /// Next decoded response, or `None` once the server closes.
    async fn next_response(&mut self) -> Option<ResponseFrame> {
        loop {
            let message = timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for frame");
            match message {
                Some(Ok(Message::Binary(data))) => {
                    return Some(ResponseFrame::decode(&data).expect("decodable response"))
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn num_connections(&mut self) -> usize {
        self.send_command(Command::NumConnections).await;
        loop {
            match self.next_response().await {
                Some(ResponseFrame::NumConnections(frame)) => return frame.num_connections,
                Some(ResponseFrame::Broadcast(_)) => continue,
                None => panic!("connection closed while waiting for count"),
            }
        }
    }

    /// Waits until the server has closed the connection.
    async fn expect_closed(&mut self) {
        while self.next_response().await.is_some() {}
    }
}

// ============================================================================
// Connection Tests
// ============================================================================

#[tokio::test]
async fn test_connect_and_count() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    assert_eq!(client.num_connections().await, 1);

    server.shutdown();
}

#[tokio::test]
async fn test_count_tracks_connections() {
    let server = TestServer::spawn().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    let _c = server.connect().await;

    assert_eq!(a.num_connections().await, 3);

    b.ws.close(None).await.unwrap();
    b.expect_closed().await;

    // The close is processed asynchronously; poll until it shows up
    let mut count = a.num_connections().await;
    for _ in 0..50 {
        if count == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        count = a.num_connections().await;
    }
    assert_eq!(count, 2);

    server.shutdown();
}

#[tokio::test]
async fn test_unknown_path_rejected_with_404() {
    let server = TestServer::spawn().await;

    let result = connect_async(format!("{}/elsewhere", server.base)).await;

    match result {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 404);
        }
        Err(e) => panic!("expected HTTP 404, got {e}"),
        Ok(_) => panic!("expected HTTP 404, upgrade succeeded"),
    }

    // The listener keeps serving after a rejected upgrade
    let mut client = server.connect().await;
    assert_eq!(client.num_connections().await, 1);

    server.shutdown();
}

// ============================================================================
// Broadcast Tests
// ============================================================================

#[tokio::test]
async fn test_broadcasts_carry_each_clients_own_id() {
    let server = TestServer::spawn_with_period(50).await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;

    let id_a = match a.next_response().await {
        Some(ResponseFrame::Broadcast(frame)) => frame.client_id,
        other => panic!("expected broadcast, got {other:?}"),
    };
    let id_b = match b.next_response().await {
        Some(ResponseFrame::Broadcast(frame)) => frame.client_id,
        other => panic!("expected broadcast, got {other:?}"),
    };

    assert_ne!(id_a, id_b);

    // Every later broadcast keeps the same identity
    match a.next_response().await {
        Some(ResponseFrame::Broadcast(frame)) => assert_eq!(frame.client_id, id_a),
        other => panic!("expected broadcast, got {other:?}"),
    }

    server.shutdown();
}

#[tokio::test]
async fn test_broadcast_timestamp_is_server_time() {
    let server = TestServer::spawn_with_period(50).await;
    let mut client = server.connect().await;

    let before = chrono::Utc::now().timestamp();
    let frame = client.next_response().await;
    let after = chrono::Utc::now().timestamp();

    match frame {
        Some(ResponseFrame::Broadcast(frame)) => {
            assert!(frame.timestamp >= before - 1 && frame.timestamp <= after);
        }
        other => panic!("expected broadcast, got {other:?}"),
    }

    server.shutdown();
}

// ============================================================================
// Command Tests
// ============================================================================

#[tokio::test]
async fn test_unsubscribe_closes_connection() {
    let server = TestServer::spawn().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;

    a.send_command(Command::Unsubscribe).await;
    a.expect_closed().await;

    assert_eq!(b.num_connections().await, 1);

    server.shutdown();
}

#[tokio::test]
async fn test_unknown_command_closes_connection() {
    let server = TestServer::spawn().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;

    a.send_raw(br#"{"command":"BOGUS"}"#).await;
    a.expect_closed().await;

    assert_eq!(b.num_connections().await, 1);

    server.shutdown();
}

#[tokio::test]
async fn test_subscribe_again_is_harmless() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.send_command(Command::Subscribe).await;
    client.send_command(Command::Subscribe).await;

    assert_eq!(client.num_connections().await, 1);

    server.shutdown();
}

#[tokio::test]
async fn test_text_frame_ends_connection() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client
        .ws
        .send(Message::Text(r#"{"command":"NUM_CONNECTIONS"}"#.to_string()))
        .await
        .unwrap();

    client.expect_closed().await;

    server.shutdown();
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_shutdown_closes_clients() {
    let server = TestServer::spawn().await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    assert_eq!(a.num_connections().await, 2);

    server.shutdown();

    a.expect_closed().await;
    b.expect_closed().await;
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    assert_eq!(client.num_connections().await, 1);

    server.shutdown();
    client.expect_closed().await;

    // Give the accept loop a moment to observe cancellation
    tokio::time::sleep(Duration::from_millis(50)).await;
    let result = timeout(RECV_TIMEOUT, connect_async(server.url.as_str())).await;
    assert!(!matches!(result, Ok(Ok(_))));
}
