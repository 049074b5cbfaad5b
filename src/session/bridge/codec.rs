//! Wire format between the agent and the protocol sidecar
//!
//! Pure routing and (de)serialization; no I/O happens here.

use super::connection::BridgeTopics;
use crate::session::{SessionEvent, WorldEvent, WorldState};
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::Event;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Commands published on the `command` topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeCommand {
    Connect {
        host: String,
        port: u16,
        username: String,
    },
    Disconnect,
    Chat {
        text: String,
    },
    Look {
        yaw: f32,
        pitch: f32,
    },
    MoveTo {
        x: i64,
        y: i64,
        z: i64,
    },
    Respawn,
    Consume {
        slot: u32,
    },
}

/// Notifications received on the `event` topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    Connected,
    LoggedIn,
    Spawned,
    Died,
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    Error {
        message: String,
    },
    Chat {
        username: String,
        message: String,
    },
    Health,
    Rain,
}

impl From<BridgeEvent> for SessionEvent {
    fn from(event: BridgeEvent) -> Self {
        match event {
            BridgeEvent::Connected => SessionEvent::Connected,
            BridgeEvent::LoggedIn => SessionEvent::LoggedIn,
            BridgeEvent::Spawned => SessionEvent::Spawned,
            BridgeEvent::Died => SessionEvent::Died,
            BridgeEvent::Disconnected { reason } => SessionEvent::Disconnected(reason),
            BridgeEvent::Error { message } => SessionEvent::Error(message),
            BridgeEvent::Chat { username, message } => {
                SessionEvent::World(WorldEvent::Chat { username, message })
            }
            BridgeEvent::Health => SessionEvent::World(WorldEvent::Health),
            BridgeEvent::Rain => SessionEvent::World(WorldEvent::Rain),
        }
    }
}

/// Routing decisions for raw MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    ConnectionAcknowledged,
    MessageReceived {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    Disconnected,
    SubscriptionConfirmed,
    InfrastructureEvent(String),
    OutgoingEvent,
}

/// Decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(SessionEvent),
    World(Box<WorldState>),
}

pub struct BridgeCodec;

impl BridgeCodec {
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.to_vec(),
                    retain: publish.retain,
                },
                Packet::Disconnect(_) => EventRoute::Disconnected,
                Packet::SubAck(_) => EventRoute::SubscriptionConfirmed,
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Decode a message received on one of the inbound topics
    ///
    /// Retained events are stale by definition and are skipped; a retained
    /// world snapshot is still the best picture available and is accepted.
    pub fn decode_inbound(
        topics: &BridgeTopics,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<Option<Inbound>, String> {
        if topic == topics.event {
            if retain {
                debug!("Ignoring retained event on topic: {}", topic);
                return Ok(None);
            }
            let event = serde_json::from_slice::<BridgeEvent>(payload)
                .map_err(|e| format!("Failed to parse bridge event: {e}"))?;
            Ok(Some(Inbound::Event(event.into())))
        } else if topic == topics.world {
            let world = serde_json::from_slice::<WorldState>(payload)
                .map_err(|e| format!("Failed to parse world snapshot: {e}"))?;
            Ok(Some(Inbound::World(Box::new(world))))
        } else {
            debug!("Ignoring message on unrelated topic: {}", topic);
            Ok(None)
        }
    }

    pub fn encode_command(command: &BridgeCommand) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(command)
    }
}
