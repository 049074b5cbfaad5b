//! AFK Agent
//!
//! Keeps one automated player connected to a game server, survives transient
//! failures with bounded reconnection, runs idle maintenance while the
//! session is live and serves a point-in-time status snapshot over HTTP.
//!
//! # Overview
//!
//! - [`agent`]: the session lifecycle core (state machine, reconnection
//!   policy, maintenance scheduler, status aggregator)
//! - [`session`]: the game session contract and its MQTT bridge implementation
//! - [`store`]: persisted connection target and behavior settings
//! - [`api`]: warp routes mapped one-to-one onto controller operations
//! - [`observability`]: tracing setup and process-wide metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use afk_agent::agent::AgentController;
//! use afk_agent::config::AgentConfig;
//! use afk_agent::session::{bridge::BridgeSessionFactory, ConnectionTarget};
//! use afk_agent::store::JsonFileStore;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AgentConfig::load_from_file(Path::new("afk-agent.toml"))?;
//! let factory = Arc::new(BridgeSessionFactory::new(
//!     &config.agent.id,
//!     &config.agent.username,
//!     config.bridge.clone(),
//! ));
//! let store = Arc::new(JsonFileStore::new(config.store.path.clone()));
//!
//! let (controller, _supervisor) = AgentController::spawn(config, factory, store).await;
//! let result = controller.start(ConnectionTarget::new("localhost", 25565)).await;
//! println!("{}", result.message);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod observability;
pub mod session;
pub mod store;
pub mod testing;

pub use agent::{ActionResult, AgentController, ConnectionState, StatusSnapshot};
pub use config::{AgentConfig, ConfigError};
pub use error::{AgentError, AgentResult};
pub use session::{ConnectionTarget, GameSession, SessionFactory};
pub use store::{SettingsRecord, SettingsStore};
