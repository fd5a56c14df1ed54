//! # Web API
//!
//! axum surface over the orchestration core: batch submission and polling,
//! the worker's row-result callback, health and operator endpoints.

use axum::Router;
use tracing::info;

pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

pub use errors::{ApiError, ApiResult};
pub use state::AppState;

/// Create the web application with all routes
pub fn create_app(state: AppState) -> Router {
    let app = Router::new()
        .merge(routes::health_routes())
        .merge(routes::batch_routes())
        .merge(routes::callback_routes())
        .merge(routes::admin_routes())
        .with_state(state);

    info!("Web application created with all routes");
    app
}
