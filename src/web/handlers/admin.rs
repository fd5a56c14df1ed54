//! # Operator Handlers

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::resilience::CircuitState;
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerResetResponse {
    pub component: String,
    pub state: CircuitState,
}

/// Reset a circuit breaker: POST /v1/admin/circuit-breakers/:name/reset
pub async fn reset_circuit_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<CircuitBreakerResetResponse>> {
    if !state.circuit_breakers().reset(&name).await {
        return Err(ApiError::not_found(format!("No circuit breaker named '{name}'")));
    }

    warn!(component = %name, "🔧 Circuit breaker reset by operator");

    let current = state
        .circuit_breakers()
        .get_component_metrics(&name)
        .await
        .map(|metrics| metrics.current_state)
        .unwrap_or(CircuitState::Closed);

    Ok(Json(CircuitBreakerResetResponse {
        component: name,
        state: current,
    }))
}
