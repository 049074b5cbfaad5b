//! Settings persistence
//!
//! One record per agent id holding the last connection target and the
//! behaviour toggles. Only the read/write contract matters to the core.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use crate::agent::daycycle::{TimeTarget, WeatherType};
use crate::session::ConnectionTarget;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Settings I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Settings file is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Settings store unavailable: {0}")]
    Unavailable(String),
}

/// Last known server plus whether the user chose to leave it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub user_disconnected: bool,
}

impl ConnectionRecord {
    pub fn target(&self) -> ConnectionTarget {
        ConnectionTarget::new(self.host.clone(), self.port)
    }
}

/// Behaviour toggles, persisted after every change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BehaviorSettings {
    pub auto_movement_enabled: bool,
    pub keep_weather_enabled: bool,
    pub target_weather: WeatherType,
    pub keep_time_enabled: bool,
    pub target_time: TimeTarget,
}

impl Default for BehaviorSettings {
    fn default() -> Self {
        Self {
            auto_movement_enabled: true,
            keep_weather_enabled: false,
            target_weather: WeatherType::Clear,
            keep_time_enabled: false,
            target_time: TimeTarget::Day,
        }
    }
}

/// Everything persisted for one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SettingsRecord {
    #[serde(default)]
    pub connection: Option<ConnectionRecord>,
    #[serde(default)]
    pub behavior: BehaviorSettings,
}

impl SettingsRecord {
    pub fn target(&self) -> Option<ConnectionTarget> {
        self.connection.as_ref().map(ConnectionRecord::target)
    }

    pub fn user_disconnected(&self) -> bool {
        self.connection
            .as_ref()
            .map(|c| c.user_disconnected)
            .unwrap_or(false)
    }
}

/// Async key-value persistence keyed by agent id
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self, agent_id: &str) -> Result<Option<SettingsRecord>, StoreError>;

    /// Upsert the full record
    async fn save(&self, agent_id: &str, record: &SettingsRecord) -> Result<(), StoreError>;
}
