//! Connection lifecycle state and its transition rules
//!
//! Pure functions only; the supervisor is the single caller that applies them.

use crate::error::AgentError;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Process-wide connection state of the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }

    /// A session handle exists and has not terminated
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }

    pub fn can_start(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    #[default]
    Alive,
    Dead,
}

impl Liveness {
    pub fn is_dead(&self) -> bool {
        matches!(self, Liveness::Dead)
    }
}

/// Inputs that move the connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    StartRequested,
    StopRequested,
    LoggedIn,
    Disconnected,
    Failed,
}

/// Compute the next state, rejecting requests that are illegal from `current`
pub fn transition(
    current: ConnectionState,
    event: &LifecycleEvent,
) -> Result<ConnectionState, AgentError> {
    match event {
        LifecycleEvent::StartRequested if current.can_start() => Ok(ConnectionState::Connecting),
        LifecycleEvent::StartRequested => Err(AgentError::AlreadyActive),
        LifecycleEvent::StopRequested if current.is_active() => Ok(ConnectionState::Disconnected),
        LifecycleEvent::StopRequested => Err(AgentError::NotConnected),
        LifecycleEvent::LoggedIn => Ok(ConnectionState::Connected),
        LifecycleEvent::Disconnected => Ok(ConnectionState::Disconnected),
        LifecycleEvent::Failed => Ok(ConnectionState::Error),
    }
}

/// Background maintenance may run only in this condition
pub fn maintenance_allowed(state: ConnectionState, liveness: Liveness) -> bool {
    state == ConnectionState::Connected && liveness == Liveness::Alive
}

/// Log a state change
pub fn log_state_transition(from: ConnectionState, to: ConnectionState) {
    match (from, to) {
        (ConnectionState::Connecting, ConnectionState::Connected) => {
            info!("Game session established");
        }
        (ConnectionState::Connected, ConnectionState::Disconnected) => {
            warn!("Game session ended");
        }
        (_, ConnectionState::Error) => {
            warn!(from = %from, "Game session failed");
        }
        _ => {
            info!(from = %from, to = %to, "Connection state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_only_from_idle_states() {
        assert_eq!(
            transition(ConnectionState::Disconnected, &LifecycleEvent::StartRequested),
            Ok(ConnectionState::Connecting)
        );
        assert_eq!(
            transition(ConnectionState::Error, &LifecycleEvent::StartRequested),
            Ok(ConnectionState::Connecting)
        );
        assert_eq!(
            transition(ConnectionState::Connecting, &LifecycleEvent::StartRequested),
            Err(AgentError::AlreadyActive)
        );
        assert_eq!(
            transition(ConnectionState::Connected, &LifecycleEvent::StartRequested),
            Err(AgentError::AlreadyActive)
        );
    }

    #[test]
    fn test_stop_requires_active_session() {
        assert_eq!(
            transition(ConnectionState::Connected, &LifecycleEvent::StopRequested),
            Ok(ConnectionState::Disconnected)
        );
        assert_eq!(
            transition(ConnectionState::Connecting, &LifecycleEvent::StopRequested),
            Ok(ConnectionState::Disconnected)
        );
        assert_eq!(
            transition(ConnectionState::Disconnected, &LifecycleEvent::StopRequested),
            Err(AgentError::NotConnected)
        );
        assert_eq!(
            transition(ConnectionState::Error, &LifecycleEvent::StopRequested),
            Err(AgentError::NotConnected)
        );
    }

    #[test]
    fn test_connecting_and_connected_treat_termination_alike() {
        for state in [ConnectionState::Connecting, ConnectionState::Connected] {
            assert_eq!(
                transition(state, &LifecycleEvent::Disconnected),
                Ok(ConnectionState::Disconnected)
            );
            assert_eq!(
                transition(state, &LifecycleEvent::Failed),
                Ok(ConnectionState::Error)
            );
        }
    }

    #[test]
    fn test_maintenance_allowed() {
        assert!(maintenance_allowed(ConnectionState::Connected, Liveness::Alive));
        assert!(!maintenance_allowed(ConnectionState::Connected, Liveness::Dead));
        assert!(!maintenance_allowed(ConnectionState::Connecting, Liveness::Alive));
        assert!(!maintenance_allowed(ConnectionState::Error, Liveness::Alive));
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Connecting).unwrap(),
            "\"connecting\""
        );
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
