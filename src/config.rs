//! Configuration system for the AFK agent
//!
//! Loaded once from a TOML file at startup. Only `[agent]` and `[bridge]` are
//! required; every other section falls back to defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main agent configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub agent: AgentSection,
    pub bridge: BridgeSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
    #[serde(default)]
    pub maintenance: MaintenanceSection,
    #[serde(default)]
    pub status: StatusSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub api: ApiSection,
}

/// Agent identity and top-level behaviour switches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSection {
    /// Agent identifier (must match [a-zA-Z0-9._-]+), also the settings key
    pub id: String,
    /// In-game name of the agent
    #[serde(default = "default_username")]
    pub username: String,
    /// Resume the last persisted target when the process starts
    #[serde(default = "default_true")]
    pub auto_connect: bool,
    /// Answer "hello bot" chat messages from other players
    #[serde(default = "default_true")]
    pub greet_players: bool,
}

/// Bridge section - MQTT broker shared with the protocol sidecar
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeSection {
    /// MQTT broker URL with protocol and port
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Topic namespace shared with the sidecar
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// How long to wait for the broker ConnAck
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Pause between the stop and start halves of a restart
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            restart_delay_ms: default_restart_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaintenanceSection {
    #[serde(default = "default_movement_min_ms")]
    pub movement_interval_min_ms: u64,
    #[serde(default = "default_movement_max_ms")]
    pub movement_interval_max_ms: u64,
    #[serde(default = "default_environment_interval_ms")]
    pub environment_interval_ms: u64,
}

impl Default for MaintenanceSection {
    fn default() -> Self {
        Self {
            movement_interval_min_ms: default_movement_min_ms(),
            movement_interval_max_ms: default_movement_max_ms(),
            environment_interval_ms: default_environment_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusSection {
    #[serde(default = "default_nearby_radius")]
    pub nearby_radius: f64,
    #[serde(default = "default_nearby_limit")]
    pub nearby_limit: usize,
}

impl Default for StatusSection {
    fn default() -> Self {
        Self {
            nearby_radius: default_nearby_radius(),
            nearby_limit: default_nearby_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSection {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiSection {
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_username() -> String {
    "AfkBot".to_string()
}

fn default_topic_prefix() -> String {
    "/game-bridge".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    10
}

fn default_base_delay_ms() -> u64 {
    5000
}

fn default_restart_delay_ms() -> u64 {
    1000
}

fn default_movement_min_ms() -> u64 {
    10_000
}

fn default_movement_max_ms() -> u64 {
    15_000
}

fn default_environment_interval_ms() -> u64 {
    5000
}

fn default_nearby_radius() -> f64 {
    30.0
}

fn default_nearby_limit() -> usize {
    10
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/settings.json")
}

fn default_api_port() -> u16 {
    3001
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid agent ID format: {0}")]
    InvalidAgentId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AgentConfig {
    /// Load configuration from TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_agent_id(&self.agent.id)?;

        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "reconnect.max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.reconnect.base_delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "reconnect.base_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.maintenance.movement_interval_min_ms == 0
            || self.maintenance.movement_interval_min_ms > self.maintenance.movement_interval_max_ms
        {
            return Err(ConfigError::InvalidConfig(
                "maintenance.movement_interval_min_ms must be in 1..=movement_interval_max_ms"
                    .to_string(),
            ));
        }
        if self.maintenance.environment_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "maintenance.environment_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.status.nearby_radius.is_nan() || self.status.nearby_radius <= 0.0 {
            return Err(ConfigError::InvalidConfig(
                "status.nearby_radius must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Helper method to get environment variable with consistent error handling
    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// Get bridge broker username from environment variable
    pub fn get_bridge_username(&self) -> Option<String> {
        Self::get_env_var_optional(self.bridge.username_env.as_ref())
    }

    /// Get bridge broker password from environment variable
    pub fn get_bridge_password(&self) -> Option<String> {
        Self::get_env_var_optional(self.bridge.password_env.as_ref())
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect.base_delay_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect.restart_delay_ms)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[agent]
id = "test-agent"
username = "TestBot"

[bridge]
broker_url = "mqtt://localhost:1883"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Validate agent ID format
fn validate_agent_id(agent_id: &str) -> Result<(), ConfigError> {
    let valid_chars = agent_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if agent_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidAgentId(format!(
            "Agent ID '{agent_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}
