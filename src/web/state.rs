//! # Web API Application State
//!
//! Shared state handed to every handler: the wired orchestration core.

use std::sync::Arc;

use crate::orchestration::{BatchOrchestrator, OrchestrationSystem, StatusQueryService};
use crate::resilience::CircuitBreakerManager;

#[derive(Clone, Debug)]
pub struct AppState {
    system: Arc<OrchestrationSystem>,
}

impl AppState {
    pub fn new(system: OrchestrationSystem) -> Self {
        Self {
            system: Arc::new(system),
        }
    }

    pub fn system(&self) -> &OrchestrationSystem {
        &self.system
    }

    pub fn orchestrator(&self) -> &BatchOrchestrator {
        &self.system.orchestrator
    }

    pub fn status_query(&self) -> &StatusQueryService {
        &self.system.status_query
    }

    pub fn circuit_breakers(&self) -> &CircuitBreakerManager {
        &self.system.circuit_breakers
    }
}
