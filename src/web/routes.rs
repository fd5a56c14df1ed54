//! Web API Routes
//!
//! Route definitions grouped by functionality.

use axum::{
    routing::{get, post},
    Router,
};

use crate::web::{handlers, state::AppState};

/// Health check routes for monitoring and load balancers
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health_check))
}

/// Client-facing batch routes
pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/batches", post(handlers::batches::create_batch))
        .route("/v1/batches/:batch_id", get(handlers::batches::get_batch))
        .route(
            "/v1/batches/:batch_id/cancel",
            post(handlers::batches::cancel_batch),
        )
        .route(
            "/v1/batches/:batch_id/resume",
            post(handlers::batches::resume_batch),
        )
}

/// Routes called by the generation worker
pub fn callback_routes() -> Router<AppState> {
    Router::new().route(
        "/v1/callbacks/rows",
        post(handlers::callbacks::record_row_result),
    )
}

/// Operator routes
pub fn admin_routes() -> Router<AppState> {
    Router::new().route(
        "/v1/admin/circuit-breakers/:name/reset",
        post(handlers::admin::reset_circuit_breaker),
    )
}
