//! Integration tests for the hub actor.
//!
//! These tests drive the hub as a complete system through `spawn_hub()`
//! and the `HubHandle` interface, with mailboxes standing in for clients.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use tickcast_protocol::ClientId;
use tickcastd::config::{HubConfig, SlowClientPolicy};
use tickcastd::hub::{
    spawn_hub, CastData, ClientHandle, HubError, HubHandle, Registration, ResponseMessage,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

/// Upper bound on any single wait in these tests
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// A hub whose timer never fires during a test, so every frame is one we cast.
fn quiet_config() -> HubConfig {
    HubConfig {
        broadcast_period_ms: 3_600_000,
        ..HubConfig::default()
    }
}

fn quiet_hub() -> HubHandle {
    spawn_hub(&quiet_config(), CancellationToken::new())
}

async fn subscribe(hub: &HubHandle, id: &str) -> mpsc::Receiver<ResponseMessage> {
    let (tx, rx) = hub.mailbox();
    let registration = hub
        .subscribe(ClientHandle::new(ClientId::new(id), tx))
        .await
        .expect("subscribe should succeed");
    assert_eq!(registration, Registration::Added);
    rx
}

async fn recv(mailbox: &mut mpsc::Receiver<ResponseMessage>) -> Option<ResponseMessage> {
    timeout(RECV_TIMEOUT, mailbox.recv())
        .await
        .expect("timed out waiting for mailbox")
}

/// Asks the hub for the count on behalf of `id` and waits for the answer.
async fn count_via(
    hub: &HubHandle,
    id: &str,
    mailbox: &mut mpsc::Receiver<ResponseMessage>,
) -> usize {
    hub.cast(CastData::unicast(ClientId::new(id))).await.unwrap();
    loop {
        match recv(mailbox).await.expect("mailbox closed") {
            ResponseMessage::NumConnections { count } => return count,
            ResponseMessage::Broadcast { .. } => continue,
        }
    }
}

// ============================================================================
// Dispatch Tests
// ============================================================================

#[tokio::test]
async fn test_broadcast_one_frame_per_client() {
    let hub = quiet_hub();
    let ids = ["a", "b", "c", "d"];
    let mut mailboxes = Vec::new();
    for id in ids {
        mailboxes.push(subscribe(&hub, id).await);
    }

    let time = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    hub.cast(CastData::broadcast_at(time)).await.unwrap();

    for (id, mailbox) in ids.iter().zip(mailboxes.iter_mut()) {
        let message = recv(mailbox).await.unwrap();
        assert_eq!(
            message,
            ResponseMessage::Broadcast {
                client_id: ClientId::new(*id),
                time,
            }
        );
    }

    // Exactly one each: a follow-up unicast is the next thing "a" sees
    assert_eq!(count_via(&hub, "a", &mut mailboxes[0]).await, 4);
}

#[tokio::test]
async fn test_broadcast_wire_frame() {
    let hub = quiet_hub();
    let mut a = subscribe(&hub, "client-a").await;

    let time = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    hub.cast(CastData::broadcast_at(time)).await.unwrap();

    let frame = recv(&mut a).await.unwrap().to_frame().encode().unwrap();
    assert_eq!(
        String::from_utf8(frame).unwrap(),
        r#"{"client_id":"client-a","timestamp":1700000000}"#
    );
}

#[tokio::test]
async fn test_unicast_reaches_only_target() {
    let hub = quiet_hub();
    let mut a = subscribe(&hub, "a").await;
    let mut b = subscribe(&hub, "b").await;

    hub.cast(CastData::unicast(ClientId::new("a"))).await.unwrap();

    let frame = recv(&mut a).await.unwrap().to_frame().encode().unwrap();
    assert_eq!(String::from_utf8(frame).unwrap(), r#"{"num_connections":2}"#);

    // Nothing for B; a broadcast afterwards is the first thing it gets
    let time = Utc.timestamp_opt(1, 0).unwrap();
    hub.cast(CastData::broadcast_at(time)).await.unwrap();
    assert!(matches!(
        recv(&mut b).await,
        Some(ResponseMessage::Broadcast { .. })
    ));
}

#[tokio::test]
async fn test_unicast_to_unregistered_client() {
    let hub = quiet_hub();
    let mut a = subscribe(&hub, "a").await;

    hub.cast(CastData::unicast(ClientId::new("nobody")))
        .await
        .unwrap();

    // Casts are handled in order, so a broadcast queued after the stray
    // unicast is the first thing A sees
    hub.cast(CastData::broadcast_now()).await.unwrap();
    assert!(matches!(
        recv(&mut a).await,
        Some(ResponseMessage::Broadcast { .. })
    ));
}

// ============================================================================
// Registration Tests
// ============================================================================

#[tokio::test]
async fn test_double_subscribe_is_idempotent() {
    let hub = quiet_hub();
    let mut a = subscribe(&hub, "a").await;

    let (tx, _rx) = hub.mailbox();
    let second = hub
        .subscribe(ClientHandle::new(ClientId::new("a"), tx))
        .await
        .unwrap();

    assert_eq!(second, Registration::AlreadyRegistered);
    assert_eq!(count_via(&hub, "a", &mut a).await, 1);
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let hub = quiet_hub();
    let mut a = subscribe(&hub, "a").await;
    let mut b = subscribe(&hub, "b").await;

    assert!(hub.unsubscribe(ClientId::new("a")).await.unwrap());

    hub.cast(CastData::broadcast_now()).await.unwrap();
    hub.cast(CastData::unicast(ClientId::new("a"))).await.unwrap();

    assert_eq!(recv(&mut a).await, None);
    assert_eq!(count_via(&hub, "b", &mut b).await, 1);
}

#[tokio::test]
async fn test_double_unsubscribe_is_noop() {
    let hub = quiet_hub();
    let _a = subscribe(&hub, "a").await;
    let mut b = subscribe(&hub, "b").await;

    assert!(hub.unsubscribe(ClientId::new("a")).await.unwrap());
    assert!(!hub.unsubscribe(ClientId::new("a")).await.unwrap());
    assert!(!hub.unsubscribe(ClientId::new("never-registered")).await.unwrap());

    assert_eq!(count_via(&hub, "b", &mut b).await, 1);
}

#[tokio::test]
async fn test_concurrent_subscribers() {
    let hub = quiet_hub();

    let mut tasks = Vec::new();
    for i in 0..50 {
        let hub = hub.clone();
        tasks.push(tokio::spawn(async move {
            let (tx, rx) = hub.mailbox();
            hub.subscribe(ClientHandle::new(ClientId::new(format!("c-{i}")), tx))
                .await
                .unwrap();
            rx
        }));
    }

    let mut mailboxes = Vec::new();
    for task in tasks {
        mailboxes.push(task.await.unwrap());
    }

    assert_eq!(count_via(&hub, "c-0", &mut mailboxes[0]).await, 50);
}

#[tokio::test]
async fn test_enforced_cap_rejects_and_recovers() {
    let config = HubConfig {
        max_clients: 2,
        enforce_max_clients: true,
        ..quiet_config()
    };
    let hub = spawn_hub(&config, CancellationToken::new());
    let _a = subscribe(&hub, "a").await;
    let _b = subscribe(&hub, "b").await;

    let (tx, _rx) = hub.mailbox();
    let rejected = hub
        .subscribe(ClientHandle::new(ClientId::new("c"), tx))
        .await;
    assert_eq!(rejected, Err(HubError::HubFull { max: 2 }));

    hub.unsubscribe(ClientId::new("a")).await.unwrap();
    let _c = subscribe(&hub, "c").await;
}

// ============================================================================
// Backpressure Tests
// ============================================================================

#[tokio::test]
async fn test_slow_client_disconnected_without_stalling_others() {
    let config = HubConfig {
        mailbox_capacity: 1,
        ..quiet_config()
    };
    let hub = spawn_hub(&config, CancellationToken::new());
    let mut slow = subscribe(&hub, "slow").await;
    let mut fast = subscribe(&hub, "fast").await;

    hub.cast(CastData::broadcast_now()).await.unwrap();
    // Fast drains between casts; slow does not
    assert!(recv(&mut fast).await.is_some());
    hub.cast(CastData::broadcast_now()).await.unwrap();
    assert!(recv(&mut fast).await.is_some());

    // Slow got the first broadcast, then was dropped from the registry
    assert!(recv(&mut slow).await.is_some());
    assert_eq!(recv(&mut slow).await, None);

    assert_eq!(count_via(&hub, "fast", &mut fast).await, 1);
}

#[tokio::test]
async fn test_slow_client_kept_under_drop_policy() {
    let config = HubConfig {
        mailbox_capacity: 1,
        slow_client_policy: SlowClientPolicy::Drop,
        ..quiet_config()
    };
    let hub = spawn_hub(&config, CancellationToken::new());
    let mut slow = subscribe(&hub, "slow").await;

    hub.cast(CastData::broadcast_now()).await.unwrap();
    hub.cast(CastData::broadcast_now()).await.unwrap();
    hub.cast(CastData::broadcast_now()).await.unwrap();

    // Only the first fitted; the rest were discarded
    assert!(matches!(
        recv(&mut slow).await,
        Some(ResponseMessage::Broadcast { .. })
    ));
    assert_eq!(count_via(&hub, "slow", &mut slow).await, 1);
}

// ============================================================================
// Timer and Shutdown Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_timer_drives_broadcasts() {
    let config = HubConfig {
        broadcast_period_ms: 100,
        ..HubConfig::default()
    };
    let hub = spawn_hub(&config, CancellationToken::new());
    let mut a = subscribe(&hub, "a").await;

    let start = tokio::time::Instant::now();
    for _ in 0..5 {
        match a.recv().await.unwrap() {
            ResponseMessage::Broadcast { client_id, .. } => {
                assert_eq!(client_id, ClientId::new("a"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
    assert!(start.elapsed() >= Duration::from_millis(500));
}

#[tokio::test]
async fn test_cancel_closes_mailboxes_and_handle() {
    let cancel = CancellationToken::new();
    let hub = spawn_hub(&quiet_config(), cancel.clone());
    let mut a = subscribe(&hub, "a").await;

    cancel.cancel();

    assert_eq!(recv(&mut a).await, None);
    assert!(!hub.is_connected());
    assert_eq!(
        hub.unsubscribe(ClientId::new("a")).await,
        Err(HubError::ChannelClosed)
    );
}
