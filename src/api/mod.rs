//! HTTP control surface
//!
//! Maps each route onto exactly one [`AgentController`] operation and keeps
//! the activity log the control panel displays.

pub mod activity;
pub mod routes;

pub use activity::{ActivityEntry, ActivityKind, ActivityLog};
pub use routes::{routes, ApiState};

use crate::agent::AgentController;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to bind API server on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: warp::Error,
    },
}

/// HTTP server for the agent's operation set
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    pub fn new(controller: AgentController, port: u16) -> Self {
        Self {
            state: Arc::new(ApiState::new(controller)),
            port,
        }
    }

    pub fn activity(&self) -> Arc<ActivityLog> {
        Arc::clone(self.state.activity())
    }

    /// Bind and serve until `shutdown` resolves
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ApiError> {
        let port = self.port;
        let (addr, server) = warp::serve(routes(self.state))
            .try_bind_with_graceful_shutdown(SocketAddr::from(([0, 0, 0, 0], port)), shutdown)
            .map_err(|source| ApiError::Bind { port, source })?;

        info!(address = %addr, "API server listening");
        server.await;
        info!("API server stopped");
        Ok(())
    }
}
