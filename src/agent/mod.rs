//! Session lifecycle core
//!
//! The supervisor owns all lifecycle state and is driven exclusively through
//! [`AgentController`]. The remaining modules are pure building blocks it
//! composes: state transitions, reconnection policy, day-cycle rules, action
//! planning, the maintenance scheduler and status derivation.

pub mod actions;
pub mod controller;
pub mod daycycle;
pub mod maintenance;
pub mod reconnect;
pub mod state;
pub mod status;
mod supervisor;

pub use actions::{ActionRequest, ActionResult};
pub use controller::AgentController;
pub use daycycle::{describe_time, DayLabel, TimeTarget, WeatherType};
pub use reconnect::{ReconnectPolicy, ReconnectionDecision};
pub use state::{ConnectionState, Liveness};
pub use status::{Activity, ConnectionStatus, NearbyEntity, StatusSnapshot};
pub use supervisor::StartOrigin;
