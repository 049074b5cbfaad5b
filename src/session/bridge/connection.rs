//! Pure broker configuration and topic construction for the session bridge

use crate::config::BridgeSection;
use crate::session::SessionError;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

/// Link state of one bridge client
#[derive(Debug, Clone, PartialEq)]
pub enum LinkState {
    /// Waiting for ConnAck
    Connecting,
    Connected,
    Disconnected(String),
}

/// Build MQTT options for a fresh bridge client
///
/// The client id carries the session generation and a timestamp so two
/// consecutive sessions never collide at the broker.
pub fn configure_bridge_options(
    agent_id: &str,
    generation: u64,
    config: &BridgeSection,
) -> Result<MqttOptions, SessionError> {
    let url = Url::parse(&config.broker_url)
        .map_err(|_| SessionError::InvalidBrokerUrl(config.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| SessionError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let client_id = format!("afk-{agent_id}-{generation}-{timestamp}");
    let mut mqtt_options = MqttOptions::new(client_id, host, port);

    if url.scheme() == "mqtts" {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username_env) = &config.username_env {
        if let Ok(username) = std::env::var(username_env) {
            let password = config
                .password_env
                .as_ref()
                .and_then(|env_name| std::env::var(env_name).ok())
                .unwrap_or_default();
            mqtt_options.set_credentials(&username, &password);
        }
    }

    mqtt_options.set_keep_alive(Duration::from_secs(30));
    // World snapshots carry full entity and inventory lists
    mqtt_options.set_max_packet_size(Some(512 * 1024));

    Ok(mqtt_options)
}

/// Normalize a topic: single leading slash, no empty levels, no trailing slash
pub fn canonicalize_topic(topic: &str) -> String {
    let levels: Vec<&str> = topic.split('/').filter(|l| !l.is_empty()).collect();
    format!("/{}", levels.join("/"))
}

/// Topics used between the agent and its protocol sidecar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeTopics {
    pub command: String,
    pub event: String,
    pub world: String,
}

impl BridgeTopics {
    /// `{prefix}/{agent_id}/command|event|world`
    pub fn new(prefix: &str, agent_id: &str) -> Self {
        let base = canonicalize_topic(&format!("{prefix}/{agent_id}"));
        Self {
            command: format!("{base}/command"),
            event: format!("{base}/event"),
            world: format!("{base}/world"),
        }
    }

    /// Topics the bridge subscribes to
    pub fn inbound(&self) -> [&str; 2] {
        [&self.event, &self.world]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_bridge_config() -> BridgeSection {
        BridgeSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            username_env: None,
            password_env: None,
            topic_prefix: "/game-bridge".to_string(),
            connect_timeout_secs: 5,
        }
    }

    #[test]
    fn test_configure_bridge_options() {
        let options = configure_bridge_options("afk-bot", 3, &test_bridge_config()).unwrap();
        assert!(options.client_id().starts_with("afk-afk-bot-3-"));
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
    }

    #[test]
    fn test_mqtts_default_port() {
        let mut config = test_bridge_config();
        config.broker_url = "mqtts://broker.example.net".to_string();

        let options = configure_bridge_options("afk-bot", 1, &config).unwrap();
        assert_eq!(options.broker_address().1, 8883);
    }

    #[test]
    fn test_invalid_broker_url() {
        let mut config = test_bridge_config();
        config.broker_url = "invalid-url".to_string();

        let result = configure_bridge_options("afk-bot", 1, &config);
        assert!(matches!(result, Err(SessionError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_topic_construction() {
        let topics = BridgeTopics::new("/game-bridge", "afk-bot");
        assert_eq!(topics.command, "/game-bridge/afk-bot/command");
        assert_eq!(topics.event, "/game-bridge/afk-bot/event");
        assert_eq!(topics.world, "/game-bridge/afk-bot/world");
    }

    #[test]
    fn test_topic_canonicalization() {
        let topics = BridgeTopics::new("game-bridge//", "afk-bot");
        assert_eq!(topics.command, "/game-bridge/afk-bot/command");
        assert_eq!(canonicalize_topic(""), "/");
        assert_eq!(canonicalize_topic("//a//b/"), "/a/b");
    }

    proptest! {
        #[test]
        fn canonicalize_topic_is_idempotent(topic in ".*") {
            let first = canonicalize_topic(&topic);
            let second = canonicalize_topic(&first);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn canonicalize_topic_has_no_empty_levels(topic in ".*") {
            let result = canonicalize_topic(&topic);
            prop_assert!(result.starts_with('/'));
            prop_assert!(!result.contains("//"));
        }
    }
}
