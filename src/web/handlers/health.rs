//! # Health Check Handler
//!
//! Liveness plus circuit breaker state, for load balancers and operators.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::orchestration::SystemStatus;
use crate::resilience::SystemCircuitBreakerMetrics;
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `degraded` while any breaker reports unhealthy
    pub status: HealthStatus,
    pub timestamp: String,
    pub version: &'static str,
    pub system: SystemStatus,
    pub health_score: f64,
    pub unhealthy_circuits: Vec<String>,
    pub circuit_breakers: SystemCircuitBreakerMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

/// Health check: GET /health
///
/// Always answers 200 while the process is serving; an open breaker only marks
/// the service as degraded.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let circuit_breakers = state.circuit_breakers().get_system_metrics().await;
    let unhealthy_circuits: Vec<String> = circuit_breakers
        .unhealthy_circuits()
        .into_iter()
        .map(str::to_string)
        .collect();

    let status = if unhealthy_circuits.is_empty() {
        HealthStatus::Ok
    } else {
        HealthStatus::Degraded
    };
    debug!(status = ?status, unhealthy = unhealthy_circuits.len(), "Health check");

    Json(HealthResponse {
        status,
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
        system: state.system().status(),
        health_score: circuit_breakers.health_score(),
        unhealthy_circuits,
        circuit_breakers,
    })
}
