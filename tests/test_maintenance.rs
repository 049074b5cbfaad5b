//! Maintenance scheduler behaviour driven through the supervisor
//!
//! Background tasks must run exactly while the session is connected and the
//! agent is alive; movement additionally follows the persisted toggle.


use afk_agent::session::{SessionEvent, WorldState};
use afk_agent::store::{BehaviorSettings, SettingsRecord};
use afk_agent::testing::mocks::{MockSessionFactory, MockSettingsStore, SessionCall};
use std::time::Duration;
use test_helpers::{advance, settle, spawn_agent, spawn_agent_with, test_config};

const MOVEMENT_MAX: Duration = Duration::from_millis(15_000);
const ENVIRONMENT_INTERVAL: Duration = Duration::from_millis(5_000);

fn is_idle_move(call: &SessionCall) -> bool {
    matches!(call, SessionCall::Look { .. } | SessionCall::MoveTo(_))
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_runs_only_while_connected() {
    let harness = spawn_agent().await;
    let status = harness.controller.get_connection_state().await.unwrap();
    assert!(!status.maintenance_active);

    harness.connect().await;
    let status = harness.controller.get_connection_state().await.unwrap();
    assert!(status.maintenance_active);
    assert!(status.is_auto_moving);

    harness.controller.stop().await;
    let status = harness.controller.get_connection_state().await.unwrap();
    assert!(!status.maintenance_active);
    assert!(!status.is_auto_moving);
}

#[tokio::test(start_paused = true)]
async fn test_death_pauses_and_respawn_resumes_maintenance() {
    let harness = spawn_agent().await;
    let session = harness.connect().await;

    session.emit(SessionEvent::Died);
    settle().await;
    let status = harness.controller.get_connection_state().await.unwrap();
    assert!(status.is_dead);
    assert!(!status.maintenance_active);

    session.clear_calls();
    advance(MOVEMENT_MAX * 2).await;
    assert!(!session.calls().iter().any(is_idle_move));

    session.emit(SessionEvent::Spawned);
    settle().await;
    let status = harness.controller.get_connection_state().await.unwrap();
    assert!(!status.is_dead);
    assert!(status.maintenance_active);
    assert!(status.is_auto_moving);
}

#[tokio::test(start_paused = true)]
async fn test_idle_movement_ticks_while_connected() {
    let harness = spawn_agent().await;
    let session = harness.connect().await;
    session.clear_calls();

    advance(MOVEMENT_MAX).await;

    // No position known yet, so every idle action is a look
    assert!(session
        .calls()
        .iter()
        .any(|call| matches!(call, SessionCall::Look { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_no_ticks_after_disconnect() {
    let harness = spawn_agent().await;
    let session = harness.connect().await;

    harness.factory.set_auto_login(false);
    session.emit(SessionEvent::Disconnected("kicked".to_string()));
    settle().await;
    session.clear_calls();

    advance(MOVEMENT_MAX * 3).await;
    assert!(!session.calls().iter().any(is_idle_move));
}

#[tokio::test(start_paused = true)]
async fn test_toggle_while_offline_persists_and_applies_on_login() {
    let harness = spawn_agent().await;

    let result = harness.controller.toggle_auto_movement().await;
    assert!(result.success);
    assert_eq!(result.message, "Automatic movement stopped");
    settle().await;

    let stored = harness.store.stored("test-agent").unwrap();
    assert!(!stored.behavior.auto_movement_enabled);
    assert!(!harness.controller.get_connection_state().await.unwrap().maintenance_active);

    harness.connect().await;
    let status = harness.controller.get_connection_state().await.unwrap();
    assert!(status.maintenance_active, "environment task still runs");
    assert!(!status.is_auto_moving);

    let result = harness.controller.toggle_auto_movement().await;
    assert_eq!(result.message, "Automatic movement started");
    let status = harness.controller.get_connection_state().await.unwrap();
    assert!(status.is_auto_moving);
}

#[tokio::test(start_paused = true)]
async fn test_persisted_toggle_is_authoritative_on_login() {
    let record = SettingsRecord {
        connection: None,
        behavior: BehaviorSettings {
            auto_movement_enabled: false,
            ..Default::default()
        },
    };
    let harness = spawn_agent_with(
        test_config(),
        MockSessionFactory::with_auto_login(),
        MockSettingsStore::with_record("test-agent", record),
    )
    .await;

    harness.connect().await;

    let status = harness.controller.get_connection_state().await.unwrap();
    assert!(!status.is_auto_moving);
    let settings = harness.controller.settings().await.unwrap();
    assert!(!settings.behavior.auto_movement_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_keep_weather_corrects_immediately_and_on_tick() {
    let factory = MockSessionFactory::with_auto_login();
    factory.set_initial_world(WorldState {
        raining: true,
        ..Default::default()
    });
    let harness = spawn_agent_with(test_config(), factory, MockSettingsStore::new()).await;
    let session = harness.connect().await;
    session.clear_calls();

    let result = harness.controller.set_keep_weather(true, Some("clear")).await;
    assert!(result.success);
    assert_eq!(result.message, "Keeping weather at clear");
    assert_eq!(session.sent_actions(), vec!["/weather clear".to_string()]);

    session.clear_calls();
    advance(ENVIRONMENT_INTERVAL).await;
    assert!(session.sent_actions().contains(&"/weather clear".to_string()));

    session.update_world(|world| world.raining = false);
    session.clear_calls();
    advance(ENVIRONMENT_INTERVAL).await;
    assert!(session.sent_actions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_keep_time_outside_window_sends_time_command() {
    let factory = MockSessionFactory::with_auto_login();
    factory.set_initial_world(WorldState {
        time_of_day: 1000,
        ..Default::default()
    });
    let harness = spawn_agent_with(test_config(), factory, MockSettingsStore::new()).await;
    let session = harness.connect().await;
    session.clear_calls();

    let result = harness.controller.set_keep_time(true, Some("night")).await;

    assert_eq!(result.message, "Keeping time at night");
    assert_eq!(session.sent_actions(), vec!["/time set night".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_keep_settings_offline_are_stored() {
    let harness = spawn_agent().await;

    let result = harness.controller.set_keep_weather(true, Some("rain")).await;
    assert!(result.success);
    let result = harness.controller.set_keep_time(false, Some("noon")).await;
    assert_eq!(result.message, "Time enforcement disabled");
    settle().await;

    let stored = harness.store.stored("test-agent").unwrap();
    assert!(stored.behavior.keep_weather_enabled);
    assert_eq!(stored.behavior.target_weather.to_string(), "rain");
    assert!(!stored.behavior.keep_time_enabled);
    assert_eq!(stored.behavior.target_time.to_string(), "noon");
}

#[tokio::test(start_paused = true)]
async fn test_failed_tick_does_not_cancel_task() {
    let factory = MockSessionFactory::with_auto_login();
    factory.set_initial_world(WorldState {
        thundering: true,
        ..Default::default()
    });
    let harness = spawn_agent_with(test_config(), factory, MockSettingsStore::new()).await;
    let session = harness.connect().await;
    harness.controller.set_keep_weather(true, Some("clear")).await;

    session.set_fail_actions(true);
    advance(ENVIRONMENT_INTERVAL).await;
    assert!(harness.controller.get_connection_state().await.unwrap().maintenance_active);

    session.set_fail_actions(false);
    session.clear_calls();
    advance(ENVIRONMENT_INTERVAL).await;
    assert!(session.sent_actions().contains(&"/weather clear".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_save_failure_keeps_in_memory_setting() {
    let store = MockSettingsStore::with_record("test-agent", SettingsRecord::default());
    store.set_fail_saves(true);
    let harness = spawn_agent_with(test_config(), MockSessionFactory::with_auto_login(), store).await;

    let result = harness.controller.toggle_auto_movement().await;
    assert!(result.success);
    settle().await;
    assert!(harness.store.saves().is_empty());

    // The stale stored record must not win over the unsaved toggle at login
    harness.connect().await;
    let settings = harness.controller.settings().await.unwrap();
    assert!(!settings.behavior.auto_movement_enabled);
    assert!(!harness.controller.get_connection_state().await.unwrap().is_auto_moving);
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_environment_pass_does_not_delay_stop() {
    let factory = MockSessionFactory::with_auto_login();
    factory.set_initial_world(WorldState {
        raining: true,
        ..Default::default()
    });
    let harness = spawn_agent_with(test_config(), factory, MockSettingsStore::new()).await;
    let session = harness.connect().await;
    harness.controller.set_keep_weather(true, Some("clear")).await;

    session.set_hang_actions(true);
    advance(ENVIRONMENT_INTERVAL).await;

    let before = tokio::time::Instant::now();
    let result = harness.controller.stop().await;
    assert!(result.success);
    assert_eq!(tokio::time::Instant::now(), before);
    assert!(!harness.controller.get_connection_state().await.unwrap().maintenance_active);
}
