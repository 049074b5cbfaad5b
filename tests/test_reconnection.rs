//! Bounded automatic reconnection
//!
//! Delays grow linearly with the attempt number, attempts stop at the
//! configured maximum, and a user stop suppresses any further attempt.


use afk_agent::agent::ConnectionState;
use afk_agent::session::{GameSession, SessionEvent};
use afk_agent::testing::mocks::{MockSessionFactory, MockSettingsStore};
use std::time::Duration;
use test_helpers::{advance, settle, spawn_agent, spawn_agent_with, target, test_config, BASE_DELAY};

const TICK: Duration = Duration::from_millis(1);

#[tokio::test(start_paused = true)]
async fn test_disconnect_schedules_reconnect_after_base_delay() {
    let harness = spawn_agent().await;
    let session = harness.connect().await;

    session.emit(SessionEvent::Disconnected("kicked".to_string()));
    settle().await;

    let status = harness.controller.get_connection_state().await.unwrap();
    assert_eq!(status.status, ConnectionState::Disconnected);
    assert_eq!(status.reconnect_attempts, 1);
    assert!(!status.maintenance_active);

    advance(BASE_DELAY - TICK).await;
    assert_eq!(harness.factory.open_count(), 1);

    advance(TICK).await;
    assert_eq!(harness.factory.open_count(), 2);

    let status = harness.controller.get_connection_state().await.unwrap();
    assert!(status.is_connected);
    assert_eq!(status.reconnect_attempts, 0, "login resets the counter");
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_uses_persisted_target() {
    let harness = spawn_agent().await;
    let session = harness.connect().await;

    session.emit(SessionEvent::Error("socket hang up".to_string()));
    advance(BASE_DELAY).await;

    let reconnected = harness.session();
    assert_eq!(reconnected.generation(), session.generation() + 2);
    assert_eq!(reconnected.target(), &target());
}

#[tokio::test(start_paused = true)]
async fn test_error_records_last_error() {
    let harness = spawn_agent().await;
    let session = harness.connect().await;

    session.emit(SessionEvent::Error("socket hang up".to_string()));
    settle().await;

    let status = harness.controller.get_connection_state().await.unwrap();
    assert_eq!(status.status, ConnectionState::Error);
    assert_eq!(status.error.as_deref(), Some("socket hang up"));
    assert_eq!(status.reconnect_attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_delays_grow_linearly_until_exhausted() {
    let factory = MockSessionFactory::new();
    factory.set_fail_connect(true);
    let harness = spawn_agent_with(test_config(), factory, MockSettingsStore::new()).await;

    harness.controller.start(target()).await;
    settle().await;
    assert_eq!(harness.factory.open_count(), 1);
    assert_eq!(
        harness.controller.get_connection_state().await.unwrap().reconnect_attempts,
        1
    );

    // attempt 1 after 1 x base
    advance(BASE_DELAY).await;
    assert_eq!(harness.factory.open_count(), 2);

    // attempt 2 after 2 x base
    advance(BASE_DELAY * 2 - TICK).await;
    assert_eq!(harness.factory.open_count(), 2);
    advance(TICK).await;
    assert_eq!(harness.factory.open_count(), 3);

    // attempt 3 after 3 x base
    advance(BASE_DELAY * 3).await;
    assert_eq!(harness.factory.open_count(), 4);

    // max_attempts = 3: nothing more
    advance(BASE_DELAY * 60).await;
    assert_eq!(harness.factory.open_count(), 4);

    let status = harness.controller.get_connection_state().await.unwrap();
    assert_eq!(status.status, ConnectionState::Error);
    assert_eq!(status.reconnect_attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_user_start_resets_counter_after_exhaustion() {
    let factory = MockSessionFactory::new();
    factory.set_fail_connect(true);
    let harness = spawn_agent_with(test_config(), factory, MockSettingsStore::new()).await;

    harness.controller.start(target()).await;
    for attempt in 1..=3u32 {
        advance(BASE_DELAY * attempt).await;
    }
    assert_eq!(harness.factory.open_count(), 4);

    harness.factory.set_fail_connect(false);
    harness.factory.set_auto_login(true);
    let result = harness.controller.start(target()).await;
    assert!(result.success);
    settle().await;

    let status = harness.controller.get_connection_state().await.unwrap();
    assert!(status.is_connected);
    assert_eq!(status.reconnect_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_reconnect_after_user_stop() {
    let harness = spawn_agent().await;
    let session = harness.connect().await;

    harness.controller.stop().await;
    session.emit(SessionEvent::Disconnected("closed".to_string()));
    advance(BASE_DELAY * 10).await;

    assert_eq!(harness.factory.open_count(), 1);
    let status = harness.controller.get_connection_state().await.unwrap();
    assert_eq!(status.reconnect_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_reconnect() {
    let harness = spawn_agent().await;
    let session = harness.connect().await;

    session.emit(SessionEvent::Disconnected("kicked".to_string()));
    settle().await;

    let result = harness.controller.stop().await;
    assert!(result.success);
    assert_eq!(result.message, "Bot stopped successfully");

    advance(BASE_DELAY * 10).await;
    assert_eq!(harness.factory.open_count(), 1);
    assert!(harness.store.stored("test-agent").unwrap().user_disconnected());
}

#[tokio::test(start_paused = true)]
async fn test_manual_start_supersedes_pending_reconnect() {
    let harness = spawn_agent().await;
    let session = harness.connect().await;

    session.emit(SessionEvent::Disconnected("kicked".to_string()));
    settle().await;

    let result = harness.controller.start(target()).await;
    assert!(result.success);
    settle().await;
    assert_eq!(harness.factory.open_count(), 2);

    advance(BASE_DELAY * 10).await;
    assert_eq!(harness.factory.open_count(), 2);
    let status = harness.controller.get_connection_state().await.unwrap();
    assert!(status.is_connected);
    assert_eq!(status.reconnect_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_failure_keeps_counting() {
    let harness = spawn_agent().await;
    let session = harness.connect().await;

    harness.factory.set_auto_login(false);
    harness.factory.set_fail_connect(true);
    session.emit(SessionEvent::Disconnected("server restart".to_string()));
    settle().await;

    advance(BASE_DELAY).await;
    let status = harness.controller.get_connection_state().await.unwrap();
    assert_eq!(status.status, ConnectionState::Error);
    assert_eq!(status.reconnect_attempts, 2);

    harness.factory.set_fail_connect(false);
    harness.factory.set_auto_login(true);
    advance(BASE_DELAY * 2).await;

    let status = harness.controller.get_connection_state().await.unwrap();
    assert!(status.is_connected);
    assert_eq!(status.reconnect_attempts, 0);
}
