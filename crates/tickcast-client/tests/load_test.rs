//! End-to-end tests of the load client against a real tickcastd server.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::time::Duration;

use tickcast_client::{ClientError, LoadClient, LoadTest, LoadTestConfig};
use tickcast_protocol::Command;
use tickcastd::config::{HubConfig, ServerConfig};
use tickcastd::hub::spawn_hub;
use tickcastd::server::DaemonServer;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Starts a server on an ephemeral port and returns its URL.
async fn start_server(broadcast_period_ms: u64, cancel: &CancellationToken) -> String {
    let hub_config = HubConfig {
        broadcast_period_ms,
        ..HubConfig::default()
    };
    let hub = spawn_hub(&hub_config, cancel.clone());
    let server_config = ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        ..ServerConfig::default()
    };
    let server = DaemonServer::bind(&server_config, hub, cancel.clone())
        .await
        .expect("bind server");
    let url = server.url();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    url
}

#[tokio::test]
async fn test_single_client_round_trip() {
    let cancel = CancellationToken::new();
    let url = start_server(3_600_000, &cancel).await;

    let mut client = LoadClient::connect(&url, 0).await.unwrap();
    client.subscribe().await.unwrap();
    let reader = client.read_responses().expect("reader not yet taken");
    assert!(client.read_responses().is_none());

    client.num_connections().await.unwrap();
    // Let the answer arrive before the close races it
    sleep(Duration::from_millis(200)).await;
    client.close().await.unwrap();

    let summary = timeout(TEST_TIMEOUT, reader).await.unwrap().unwrap();
    assert_eq!(summary.counts, vec![1]);
    assert_eq!(summary.undecodable, 0);

    cancel.cancel();
}

#[tokio::test]
async fn test_close_after_server_unsubscribe_is_ok() {
    let cancel = CancellationToken::new();
    let url = start_server(3_600_000, &cancel).await;

    let mut client = LoadClient::connect(&url, 0).await.unwrap();
    let reader = client.read_responses().unwrap();

    client.unsubscribe().await.unwrap();
    let summary = timeout(TEST_TIMEOUT, reader).await.unwrap().unwrap();
    assert!(summary.counts.is_empty());

    assert!(client.close().await.is_ok());

    cancel.cancel();
}

#[tokio::test]
async fn test_connect_refused() {
    let result = LoadClient::connect("ws://127.0.0.1:1/ws", 0).await;
    assert!(matches!(result, Err(ClientError::Connect { .. })));
}

#[tokio::test]
async fn test_scenario_against_server() {
    let cancel = CancellationToken::new();
    let url = start_server(50, &cancel).await;

    let config = LoadTestConfig {
        url,
        clients: 5,
        pause: Duration::from_millis(200),
        seed: Some(42),
    };
    let report = timeout(TEST_TIMEOUT, LoadTest::new(config).run(CancellationToken::new()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.connected, 5);
    assert_eq!(
        report.steps.iter().map(|(_, c)| *c).collect::<Vec<_>>(),
        vec![
            Command::NumConnections,
            Command::Unsubscribe,
            Command::NumConnections
        ]
    );
    assert!(report.steps.iter().all(|(index, _)| *index < 5));

    // The first count sees everyone. The second is missing only if it was
    // sent by the client that had just unsubscribed.
    assert!(report.counts.contains(&5));
    assert!(!report.counts.is_empty() && report.counts.len() <= 2);
    assert!(report.counts.iter().all(|c| *c == 5 || *c == 4));
    assert!(report.broadcasts > 0);

    cancel.cancel();
}

#[tokio::test]
async fn test_scenario_cancelled_early() {
    let cancel = CancellationToken::new();
    let url = start_server(3_600_000, &cancel).await;

    let config = LoadTestConfig {
        url,
        clients: 2,
        pause: Duration::from_secs(60),
        seed: Some(1),
    };
    let stop = CancellationToken::new();
    let run = tokio::spawn(LoadTest::new(config).run(stop.clone()));

    sleep(Duration::from_millis(200)).await;
    stop.cancel();

    let report = timeout(TEST_TIMEOUT, run).await.unwrap().unwrap().unwrap();
    assert_eq!(report.connected, 2);
    assert_eq!(report.steps.len(), 1);

    cancel.cancel();
}
