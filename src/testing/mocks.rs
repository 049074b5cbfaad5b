//! Mock implementations for testing
//!
//! Provides a scripted game session, a factory that records every session it
//! opens, and a settings store with switchable failures, so the supervisor can
//! be exercised without a broker or game server.

use crate::session::{
    BlockPos, ConnectionTarget, EntityInfo, EventSink, GameSession, InventorySlot, Position,
    SessionError, SessionEvent, SessionFactory, Vitals, WorldState,
};
use crate::store::{SettingsRecord, SettingsStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Every call the core made against a mock session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    Connect,
    Disconnect,
    Send(String),
    Look { yaw: f32, pitch: f32 },
    MoveTo(BlockPos),
    Respawn,
    Consume(u32),
}

/// Mock game session
pub struct MockSession {
    target: ConnectionTarget,
    sink: EventSink,
    calls: Mutex<Vec<SessionCall>>,
    world: Mutex<WorldState>,
    auto_login: bool,
    fail_connect: bool,
    fail_actions: AtomicBool,
    hang_actions: AtomicBool,
}

impl MockSession {
    pub fn new(target: ConnectionTarget, sink: EventSink) -> Self {
        Self {
            target,
            sink,
            calls: Mutex::new(Vec::new()),
            world: Mutex::new(WorldState::default()),
            auto_login: false,
            fail_connect: false,
            fail_actions: AtomicBool::new(false),
            hang_actions: AtomicBool::new(false),
        }
    }

    pub fn generation(&self) -> u64 {
        self.sink.generation()
    }

    /// Deliver an event as if the server produced it
    pub fn emit(&self, event: SessionEvent) -> bool {
        self.sink.emit(event)
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        lock(&self.calls).clone()
    }

    /// Chat lines and commands sent through `send_action`
    pub fn sent_actions(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                SessionCall::Send(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    pub fn set_world(&self, world: WorldState) {
        *lock(&self.world) = world;
    }

    pub fn update_world(&self, change: impl FnOnce(&mut WorldState)) {
        change(&mut lock(&self.world));
    }

    /// Make every subsequent command fail
    pub fn set_fail_actions(&self, fail: bool) {
        self.fail_actions.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `send_action` wait forever, like a wedged sidecar
    pub fn set_hang_actions(&self, hang: bool) {
        self.hang_actions.store(hang, Ordering::SeqCst);
    }

    fn record(&self, call: SessionCall) -> Result<(), SessionError> {
        if self.fail_actions.load(Ordering::SeqCst) {
            return Err(SessionError::PublishFailed("Mock action failure".to_string()));
        }
        lock(&self.calls).push(call);
        Ok(())
    }
}

#[async_trait]
impl GameSession for MockSession {
    fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    async fn connect(&self) -> Result<(), SessionError> {
        lock(&self.calls).push(SessionCall::Connect);
        if self.fail_connect {
            return Err(SessionError::ConnectionFailed("connect ECONNREFUSED".to_string()));
        }
        if self.auto_login {
            self.sink.emit(SessionEvent::Connected);
            self.sink.emit(SessionEvent::LoggedIn);
            self.sink.emit(SessionEvent::Spawned);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        lock(&self.calls).push(SessionCall::Disconnect);
        Ok(())
    }

    async fn send_action(&self, text: &str) -> Result<(), SessionError> {
        if self.hang_actions.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.record(SessionCall::Send(text.to_string()))
    }

    async fn look(&self, yaw: f32, pitch: f32) -> Result<(), SessionError> {
        self.record(SessionCall::Look { yaw, pitch })
    }

    async fn move_to(&self, goal: BlockPos) -> Result<(), SessionError> {
        self.record(SessionCall::MoveTo(goal))
    }

    async fn respawn(&self) -> Result<(), SessionError> {
        self.record(SessionCall::Respawn)
    }

    async fn consume(&self, slot: u32) -> Result<(), SessionError> {
        self.record(SessionCall::Consume(slot))
    }

    fn current_position(&self) -> Option<Position> {
        lock(&self.world).position
    }

    fn current_health(&self) -> Vitals {
        lock(&self.world).vitals
    }

    fn current_inventory_slots(&self) -> Vec<InventorySlot> {
        lock(&self.world).inventory.clone()
    }

    fn current_entities(&self) -> Vec<EntityInfo> {
        lock(&self.world).entities.clone()
    }

    fn current_time_of_day(&self) -> i64 {
        lock(&self.world).time_of_day
    }

    fn is_raining(&self) -> bool {
        lock(&self.world).raining
    }

    fn is_thundering(&self) -> bool {
        lock(&self.world).thundering
    }

    fn self_entity_id(&self) -> Option<u64> {
        lock(&self.world).self_id
    }
}

/// Mock session factory that keeps every session it opened
#[derive(Default)]
pub struct MockSessionFactory {
    sessions: Mutex<Vec<Arc<MockSession>>>,
    initial_world: Mutex<WorldState>,
    auto_login: AtomicBool,
    fail_open: AtomicBool,
    fail_connect: AtomicBool,
}

impl MockSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions report connected, logged in and spawned as soon as they connect
    pub fn with_auto_login() -> Self {
        let factory = Self::default();
        factory.set_auto_login(true);
        factory
    }

    pub fn set_auto_login(&self, enabled: bool) {
        self.auto_login.store(enabled, Ordering::SeqCst);
    }

    /// `open` itself fails, as with an invalid broker URL
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// `connect` fails, as with a refused connection
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// World every new session starts with
    pub fn set_initial_world(&self, world: WorldState) {
        *lock(&self.initial_world) = world;
    }

    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        lock(&self.sessions).clone()
    }

    pub fn open_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn last_session(&self) -> Option<Arc<MockSession>> {
        lock(&self.sessions).last().cloned()
    }
}

impl SessionFactory for MockSessionFactory {
    fn open(
        &self,
        target: ConnectionTarget,
        sink: EventSink,
    ) -> Result<Arc<dyn GameSession>, SessionError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(SessionError::InvalidBrokerUrl("mock://unreachable".to_string()));
        }

        let session = Arc::new(MockSession {
            auto_login: self.auto_login.load(Ordering::SeqCst),
            fail_connect: self.fail_connect.load(Ordering::SeqCst),
            ..MockSession::new(target, sink)
        });
        session.set_world(lock(&self.initial_world).clone());
        lock(&self.sessions).push(Arc::clone(&session));

        Ok(session)
    }
}

/// Mock settings store with switchable failures and a save log
#[derive(Default)]
pub struct MockSettingsStore {
    records: Mutex<HashMap<String, SettingsRecord>>,
    saves: Mutex<Vec<SettingsRecord>>,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
}

impl MockSettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(agent_id: &str, record: SettingsRecord) -> Self {
        let store = Self::default();
        lock(&store.records).insert(agent_id.to_string(), record);
        store
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Records passed to successful saves, oldest first
    pub fn saves(&self) -> Vec<SettingsRecord> {
        lock(&self.saves).clone()
    }

    pub fn stored(&self, agent_id: &str) -> Option<SettingsRecord> {
        lock(&self.records).get(agent_id).cloned()
    }

    /// Change the stored record behind the agent's back
    pub fn put(&self, agent_id: &str, record: SettingsRecord) {
        lock(&self.records).insert(agent_id.to_string(), record);
    }
}

#[async_trait]
impl SettingsStore for MockSettingsStore {
    async fn load(&self, agent_id: &str) -> Result<Option<SettingsRecord>, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("Mock load failure".to_string()));
        }
        Ok(lock(&self.records).get(agent_id).cloned())
    }

    async fn save(&self, agent_id: &str, record: &SettingsRecord) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("Mock save failure".to_string()));
        }
        lock(&self.records).insert(agent_id.to_string(), record.clone());
        lock(&self.saves).push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_mock_session_records_calls() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = MockSession::new(ConnectionTarget::new("localhost", 25565), EventSink::new(1, tx));

        session.send_action("/kill").await.unwrap();
        session.respawn().await.unwrap();

        assert_eq!(
            session.calls(),
            vec![SessionCall::Send("/kill".to_string()), SessionCall::Respawn]
        );
        assert_eq!(session.sent_actions(), vec!["/kill".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_session_failure_mode() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = MockSession::new(ConnectionTarget::new("localhost", 25565), EventSink::new(1, tx));
        session.set_fail_actions(true);

        assert!(session.send_action("hi").await.is_err());
        assert!(session.calls().is_empty());
    }

    #[tokio::test]
    async fn test_factory_auto_login_emits_lifecycle_events() {
        let factory = MockSessionFactory::with_auto_login();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let session = factory
            .open(ConnectionTarget::new("localhost", 25565), EventSink::new(3, tx))
            .unwrap();
        session.connect().await.unwrap();

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|envelope| envelope.event)
            .collect();
        assert_eq!(
            events,
            vec![SessionEvent::Connected, SessionEvent::LoggedIn, SessionEvent::Spawned]
        );
        assert_eq!(factory.open_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_store_failures() {
        let store = MockSettingsStore::new();
        store.set_fail_saves(true);

        assert!(store.save("a", &SettingsRecord::default()).await.is_err());
        assert!(store.saves().is_empty());
        assert!(store.load("a").await.unwrap().is_none());
    }
}
