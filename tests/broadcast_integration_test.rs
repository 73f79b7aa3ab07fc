//! Broadcast manager behaviour through the public API

mod common;

use common::{InMemoryStatusStore, MockSocket};
use importer_core::broadcast::{
    BroadcastManager, ChannelSocket, ClientSocket, OptimizedStatusEvent, OutboundFrame,
};
use importer_core::config::BroadcastConfig;
use importer_core::constants::{close_codes, ImportStatus};
use importer_core::events::{PersistingStatusPublisher, StatusEvent, StatusPublisher};
use std::sync::Arc;
use std::time::Duration;

const MAX_CLIENTS: usize = 3;

fn config() -> BroadcastConfig {
    BroadcastConfig {
        max_clients: MAX_CLIENTS,
        heartbeat_interval_ms: 1_000,
        batch_delay_ms: 100,
        max_batch_size: 10,
        rate_limit_ms: 50,
        client_buffer: 8,
    }
}

fn connect(manager: &BroadcastManager) -> (String, Arc<MockSocket>) {
    let socket = Arc::new(MockSocket::default());
    let id = manager
        .register_client(socket.clone())
        .expect("client admitted");
    (id, socket)
}

fn progress(message: &str) -> StatusEvent {
    StatusEvent::new("imp-1", ImportStatus::Processing).with_message(message)
}

#[tokio::test(start_paused = true)]
async fn test_connection_beyond_capacity_closed_with_1013() {
    let manager = BroadcastManager::new(config());
    let clients: Vec<_> = (0..MAX_CLIENTS).map(|_| connect(&manager)).collect();

    let extra = Arc::new(MockSocket::default());
    assert!(manager.register_client(extra.clone()).is_none());

    assert_eq!(manager.client_count(), MAX_CLIENTS);
    assert_eq!(
        extra.close_frame(),
        Some((
            close_codes::TRY_AGAIN_LATER,
            "Too many connections".to_string()
        ))
    );
    for (id, socket) in &clients {
        let welcome = socket.messages_of_type("connection_established");
        assert_eq!(welcome.len(), 1);
        assert_eq!(welcome[0]["clientId"], id.as_str());
    }
}

#[tokio::test(start_paused = true)]
async fn test_completed_event_delivered_immediately_while_batch_pending() {
    let manager = BroadcastManager::new(config());
    let (_, first) = connect(&manager);
    let (_, second) = connect(&manager);

    manager.broadcast_status(progress("parsing"));
    manager.broadcast_status(StatusEvent::new("imp-1", ImportStatus::Completed));

    for socket in [&first, &second] {
        let updates = socket.messages_of_type("status_update");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0]["data"]["s"], "COMPLETED");
        assert!(socket.messages_of_type("status_update_batch").is_empty());
    }
    assert_eq!(manager.stats().pending_events, 1);

    tokio::time::sleep(Duration::from_millis(150)).await;

    let batch = first.messages_of_type("status_update_batch");
    assert_eq!(batch.len(), 1);
    let events: Vec<OptimizedStatusEvent> =
        serde_json::from_value(batch[0]["events"].clone()).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].clone().into_status_event().message.as_deref(),
        Some("parsing")
    );
    assert_eq!(manager.stats().batches_sent, 1);
}

#[tokio::test(start_paused = true)]
async fn test_silent_client_removed_on_next_sweep() {
    let manager = BroadcastManager::new(config());
    let (quiet_id, quiet) = connect(&manager);
    let (chatty_id, _) = connect(&manager);

    tokio::time::advance(Duration::from_millis(1_500)).await;
    manager.handle_client_message(&chatty_id, r#"{"type":"ping"}"#);
    tokio::time::advance(Duration::from_millis(600)).await;

    assert_eq!(manager.sweep_heartbeats(), 1);

    let remaining: Vec<String> = manager.clients().into_iter().map(|c| c.id).collect();
    assert_eq!(remaining, vec![chatty_id]);
    assert_ne!(remaining[0], quiet_id);
    assert_eq!(
        quiet.close_frame().map(|(code, _)| code),
        Some(close_codes::GOING_AWAY)
    );
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_timer_pings_after_start() {
    let manager = BroadcastManager::new(config());
    manager.start();
    let (_, socket) = connect(&manager);

    tokio::time::sleep(Duration::from_millis(1_050)).await;
    assert_eq!(socket.ping_count(), 1);

    manager.shutdown();
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(socket.ping_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_drops_second_non_critical_but_not_critical() {
    let manager = BroadcastManager::new(config());
    let (_, socket) = connect(&manager);

    manager.broadcast_status(progress("one"));
    tokio::time::sleep(Duration::from_millis(101)).await;
    assert_eq!(socket.messages_of_type("status_update_batch").len(), 1);

    // inside the 50ms window of the first batch
    manager.broadcast_status(StatusEvent::new("imp-1", ImportStatus::Failed).with_error("boom"));
    manager.broadcast_status(progress("two"));
    manager.flush_pending();

    assert_eq!(socket.messages_of_type("status_update").len(), 1);
    assert_eq!(socket.messages_of_type("status_update_batch").len(), 1);
    assert_eq!(manager.stats().messages_dropped, 1);
}

#[tokio::test(start_paused = true)]
async fn test_one_broken_client_does_not_block_others() {
    let manager = BroadcastManager::new(config());
    let (_, healthy) = connect(&manager);
    let (_, broken) = connect(&manager);
    broken.break_connection();

    manager.broadcast_status(StatusEvent::new("imp-1", ImportStatus::Completed));

    assert_eq!(healthy.messages_of_type("status_update").len(), 1);
    assert_eq!(manager.client_count(), 1);
}

#[tokio::test]
async fn test_channel_socket_full_buffer_drops_frame_but_keeps_client() {
    let manager = BroadcastManager::new(BroadcastConfig {
        client_buffer: 1,
        ..config()
    });
    let (socket, mut frames) = ChannelSocket::channel(1);
    let id = manager.register_client(Arc::new(socket)).unwrap();

    // the welcome fills the buffer
    manager.broadcast_status(StatusEvent::new("imp-1", ImportStatus::Completed));
    assert_eq!(manager.client_count(), 1);
    assert_eq!(manager.stats().messages_dropped, 1);

    match frames.recv().await {
        Some(OutboundFrame::Text(text)) => assert!(text.contains(&id)),
        other => panic!("unexpected frame: {other:?}"),
    }

    drop(frames);
    manager.broadcast_status(StatusEvent::new("imp-2", ImportStatus::Completed));
    assert_eq!(manager.client_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_ping_on_full_buffer_ends_the_connection() {
    let manager = BroadcastManager::new(BroadcastConfig {
        client_buffer: 1,
        ..config()
    });
    let (socket, mut frames) = ChannelSocket::channel(1);
    let connection = frames.closed_token();
    manager.register_client(Arc::new(socket)).unwrap();

    // the unread welcome leaves no room for the ping
    tokio::time::advance(Duration::from_millis(1_000)).await;
    assert_eq!(manager.sweep_heartbeats(), 1);

    assert_eq!(manager.client_count(), 0);
    assert!(connection.is_cancelled());
    assert_eq!(
        frames.recv().await,
        Some(OutboundFrame::Close(
            close_codes::GOING_AWAY,
            close_codes::PING_FAILED_REASON.to_string()
        ))
    );
    assert_eq!(frames.recv().await, None);
}

#[tokio::test]
async fn test_persisting_publisher_broadcasts_even_when_store_fails() {
    let manager = BroadcastManager::new(config());
    let (_, socket) = connect(&manager);
    let store = Arc::new(InMemoryStatusStore::failing());
    let publisher = PersistingStatusPublisher::new(store, Arc::new(manager.clone()));

    publisher
        .publish(StatusEvent::new("imp-1", ImportStatus::Failed).with_error("parse failed"))
        .await;

    let updates = socket.messages_of_type("status_update");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["data"]["e"], "parse failed");
}

#[tokio::test]
async fn test_persisting_publisher_records_history() {
    let manager = BroadcastManager::new(config());
    let store = Arc::new(InMemoryStatusStore::default());
    let publisher = PersistingStatusPublisher::new(store.clone(), Arc::new(manager));

    publisher.publish(progress("cleaning")).await;

    assert_eq!(store.events().len(), 1);
}

#[tokio::test]
async fn test_shutdown_closes_every_client() {
    let manager = BroadcastManager::new(config());
    let sockets: Vec<_> = (0..2).map(|_| connect(&manager).1).collect();

    manager.shutdown();

    assert_eq!(manager.client_count(), 0);
    for socket in sockets {
        assert_eq!(
            socket.close_frame(),
            Some((close_codes::GOING_AWAY, "Server shutting down".to_string()))
        );
        assert!(!socket.is_open());
    }
}
