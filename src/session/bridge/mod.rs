//! Game session handle backed by an MQTT protocol sidecar
//!
//! The sidecar speaks the actual game protocol. This side only publishes JSON
//! commands and consumes JSON events and world snapshots:
//!
//! - `{prefix}/{agent_id}/command` agent to sidecar
//! - `{prefix}/{agent_id}/event` sidecar to agent
//! - `{prefix}/{agent_id}/world` sidecar to agent, latest world snapshot

pub mod client;
pub mod codec;
pub mod connection;

pub use client::{BridgeSession, BridgeSessionFactory};
pub use codec::{BridgeCodec, BridgeCommand, BridgeEvent};
pub use connection::{canonicalize_topic, configure_bridge_options, BridgeTopics, LinkState};
