//! Game session handle contract
//!
//! The core drives a game session through a small command surface and listens
//! to it through an event channel. Protocol details live behind this trait; the
//! shipped implementation in [`bridge`] talks to a protocol sidecar over MQTT.

pub mod bridge;
pub mod types;

pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised by a game session handle
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Publishing failed: {0}")]
    PublishFailed(String),
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Session is closed")]
    Closed,
}

/// World-level notifications that do not change the lifecycle state
#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    Chat { username: String, message: String },
    Health,
    Rain,
}

/// Everything a session can report back to the supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Transport link to the server is up, login still pending
    Connected,
    LoggedIn,
    Spawned,
    Died,
    Disconnected(String),
    Error(String),
    World(WorldEvent),
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Connected => "connected",
            SessionEvent::LoggedIn => "logged_in",
            SessionEvent::Spawned => "spawned",
            SessionEvent::Died => "died",
            SessionEvent::Disconnected(_) => "disconnected",
            SessionEvent::Error(_) => "error",
            SessionEvent::World(WorldEvent::Chat { .. }) => "chat",
            SessionEvent::World(WorldEvent::Health) => "health",
            SessionEvent::World(WorldEvent::Rain) => "rain",
        }
    }
}

/// Event tagged with the generation of the session that produced it
#[derive(Debug, Clone)]
pub struct SessionEnvelope {
    pub generation: u64,
    pub event: SessionEvent,
}

/// Sending half of the supervisor's event queue, bound to one session
///
/// Every session gets its own generation number so that late events from a
/// handle that has already been replaced can be told apart and dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<SessionEnvelope>,
}

impl EventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<SessionEnvelope>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue an event; returns false once the supervisor is gone
    pub fn emit(&self, event: SessionEvent) -> bool {
        self.tx
            .send(SessionEnvelope {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// One live connection to the remote game server
#[async_trait]
pub trait GameSession: Send + Sync {
    /// Server this handle was opened toward
    fn target(&self) -> &ConnectionTarget;

    /// Begin connecting; the outcome is observed through events
    async fn connect(&self) -> Result<(), SessionError>;

    async fn disconnect(&self) -> Result<(), SessionError>;

    /// Fire-and-forget chat line or slash command
    async fn send_action(&self, text: &str) -> Result<(), SessionError>;

    async fn look(&self, yaw: f32, pitch: f32) -> Result<(), SessionError>;

    /// Set a pathfinding goal at the given block
    async fn move_to(&self, goal: BlockPos) -> Result<(), SessionError>;

    async fn respawn(&self) -> Result<(), SessionError>;

    /// Equip the item in `slot` and consume it
    async fn consume(&self, slot: u32) -> Result<(), SessionError>;

    fn current_position(&self) -> Option<Position>;

    fn current_health(&self) -> Vitals;

    fn current_inventory_slots(&self) -> Vec<InventorySlot>;

    fn current_entities(&self) -> Vec<EntityInfo>;

    fn current_time_of_day(&self) -> i64;

    fn is_raining(&self) -> bool;

    fn is_thundering(&self) -> bool {
        false
    }

    fn self_entity_id(&self) -> Option<u64>;
}

/// Opens fresh session handles; one call per `start`
pub trait SessionFactory: Send + Sync {
    fn open(
        &self,
        target: ConnectionTarget,
        sink: EventSink,
    ) -> Result<Arc<dyn GameSession>, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(7, tx);

        assert!(sink.emit(SessionEvent::LoggedIn));

        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.generation, 7);
        assert_eq!(envelope.event, SessionEvent::LoggedIn);
    }

    #[test]
    fn test_sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(1, tx);
        drop(rx);

        assert!(!sink.emit(SessionEvent::Died));
    }

    #[test]
    fn test_event_names() {
        assert_eq!(SessionEvent::Disconnected("x".into()).name(), "disconnected");
        assert_eq!(
            SessionEvent::World(WorldEvent::Chat {
                username: "a".into(),
                message: "b".into()
            })
            .name(),
            "chat"
        );
    }
}
