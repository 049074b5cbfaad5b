//! Cloneable handle exposing the agent's operation set
//!
//! Each method enqueues one command for the supervisor and waits for its
//! reply. Preconditions are checked by the supervisor; connection
//! establishment itself happens later and is observed through status calls.

use super::actions::{ActionRequest, ActionResult};
use super::daycycle::{TimeTarget, WeatherType};
use super::state::ConnectionState;
use super::status::{ConnectionStatus, StatusSnapshot};
use super::supervisor::{Command, Reply, StartOrigin, Supervisor};
use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};
use crate::session::{ConnectionTarget, SessionFactory};
use crate::store::{SettingsRecord, SettingsStore};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const COMMAND_QUEUE_DEPTH: usize = 64;

#[derive(Clone)]
pub struct AgentController {
    tx: mpsc::Sender<Command>,
}

impl AgentController {
    /// Load persisted settings, start the supervisor and resume the last
    /// session when allowed
    pub async fn spawn(
        config: AgentConfig,
        factory: Arc<dyn SessionFactory>,
        store: Arc<dyn SettingsStore>,
    ) -> (Self, JoinHandle<()>) {
        let agent_id = config.agent.id.clone();
        let record = match store.load(&agent_id).await {
            Ok(record) => record.unwrap_or_default(),
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Failed to load settings, using defaults");
                SettingsRecord::default()
            }
        };

        let resume_target = if config.agent.auto_connect && !record.user_disconnected() {
            record.target()
        } else {
            None
        };

        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let supervisor = Supervisor::new(Arc::new(config), factory, store, record, rx);
        let handle = tokio::spawn(supervisor.run());
        let controller = Self { tx };

        if let Some(target) = resume_target {
            info!(agent_id = %agent_id, target = %target, "Resuming last session");
            let result = controller
                .request(|reply| Command::Start {
                    target,
                    origin: StartOrigin::Startup,
                    reply,
                })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "Could not resume last session");
            }
        }

        (controller, handle)
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<AgentResult<T>>) -> Command) -> AgentResult<T> {
        self.query(command).await?
    }

    async fn query<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> AgentResult<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| AgentError::SupervisorUnavailable)?;
        response.await.map_err(|_| AgentError::SupervisorUnavailable)
    }

    pub async fn start(&self, target: ConnectionTarget) -> ActionResult {
        self.request(|reply| Command::Start {
            target,
            origin: StartOrigin::User,
            reply,
        })
        .await
        .into()
    }

    pub async fn stop(&self) -> ActionResult {
        self.request(|reply| Command::Stop { reply }).await.into()
    }

    pub async fn restart(&self) -> ActionResult {
        self.request(|reply| Command::Restart { reply }).await.into()
    }

    pub async fn request_action(&self, request: ActionRequest) -> ActionResult {
        self.request(|reply| Command::Action { request, reply })
            .await
            .into()
    }

    pub async fn kill(&self) -> ActionResult {
        self.request_action(ActionRequest::Kill).await
    }

    pub async fn heal(&self) -> ActionResult {
        self.request_action(ActionRequest::Heal).await
    }

    pub async fn respawn(&self) -> ActionResult {
        self.request_action(ActionRequest::Respawn).await
    }

    pub async fn feed(&self) -> ActionResult {
        self.request_action(ActionRequest::Feed).await
    }

    pub async fn feed_food(&self) -> ActionResult {
        self.request_action(ActionRequest::FeedFood).await
    }

    pub async fn starve(&self) -> ActionResult {
        self.request_action(ActionRequest::Starve).await
    }

    pub async fn send_chat(&self, message: impl Into<String>) -> ActionResult {
        self.request_action(ActionRequest::Chat(message.into())).await
    }

    pub async fn execute_command(&self, command: impl Into<String>) -> ActionResult {
        self.request_action(ActionRequest::Command(command.into()))
            .await
    }

    pub async fn teleport(&self, x: f64, y: f64, z: f64) -> ActionResult {
        self.request_action(ActionRequest::Teleport { x, y, z }).await
    }

    pub async fn collect_nearby_items(&self) -> ActionResult {
        self.request(|reply| Command::CollectItems { reply })
            .await
            .into()
    }

    pub async fn set_weather(&self, weather: &str) -> ActionResult {
        let weather: WeatherType = match weather.parse() {
            Ok(weather) => weather,
            Err(e) => return e.to_action_result(),
        };
        self.request(|reply| Command::SetWeather { weather, reply })
            .await
            .into()
    }

    pub async fn set_time(&self, value: &str) -> ActionResult {
        let target: TimeTarget = match value.parse() {
            Ok(target) => target,
            Err(e) => return e.to_action_result(),
        };
        self.request(|reply| Command::SetTime { target, reply })
            .await
            .into()
    }

    /// Enable or disable weather enforcement; `weather` replaces the target
    pub async fn set_keep_weather(&self, enabled: bool, weather: Option<&str>) -> ActionResult {
        let weather = match weather.map(str::parse::<WeatherType>).transpose() {
            Ok(weather) => weather,
            Err(e) => return e.to_action_result(),
        };
        self.request(|reply| Command::SetKeepWeather {
            enabled,
            weather,
            reply,
        })
        .await
        .into()
    }

    /// Enable or disable time enforcement; `value` replaces the target
    pub async fn set_keep_time(&self, enabled: bool, value: Option<&str>) -> ActionResult {
        let target = match value.map(str::parse::<TimeTarget>).transpose() {
            Ok(target) => target,
            Err(e) => return e.to_action_result(),
        };
        self.request(|reply| Command::SetKeepTime {
            enabled,
            target,
            reply,
        })
        .await
        .into()
    }

    pub async fn toggle_auto_movement(&self) -> ActionResult {
        self.request(|reply| Command::ToggleAutoMovement { reply })
            .await
            .into()
    }

    /// Never fails; an unreachable supervisor reads as offline
    pub async fn get_status(&self) -> StatusSnapshot {
        match self.query(|reply| Command::Status { reply }).await {
            Ok(snapshot) => snapshot,
            Err(e) => StatusSnapshot {
                online: false,
                connection_state: ConnectionState::Disconnected,
                last_error: Some(e.to_string()),
                reconnect_attempts: 0,
                live: None,
            },
        }
    }

    pub async fn get_connection_state(&self) -> AgentResult<ConnectionStatus> {
        self.query(|reply| Command::ConnectionStatus { reply }).await
    }

    /// Current in-memory settings record
    pub async fn settings(&self) -> AgentResult<SettingsRecord> {
        self.query(|reply| Command::Settings { reply }).await
    }

    /// Close the session and flush pending settings writes
    pub async fn shutdown(&self) -> AgentResult<()> {
        self.query(|reply| Command::Shutdown { reply }).await
    }
}
