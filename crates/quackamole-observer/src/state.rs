//! Shared application state for the HTTP API.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use quackamole_core::SimulationSupervisor;

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The running simulation.
    pub supervisor: Arc<SimulationSupervisor>,
    /// When the API came up, for the health endpoint.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wrap a running supervisor.
    pub fn new(supervisor: Arc<SimulationSupervisor>) -> Self {
        Self {
            supervisor,
            started_at: Utc::now(),
        }
    }
}
