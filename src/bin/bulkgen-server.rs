//! # Bulkgen Server
//!
//! Standalone HTTP server around the orchestration core.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin bulkgen-server
//!
//! # Run with a specific environment
//! BULKGEN_ENV=production cargo run --bin bulkgen-server
//! ```

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use bulkgen::config::ConfigManager;
use bulkgen::logging;
use bulkgen::orchestration::OrchestrationSystem;
use bulkgen::web::{create_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_manager = ConfigManager::load().context("Failed to load configuration")?;
    let config = config_manager.config();

    logging::init_with_config(&config.telemetry);

    info!("🚀 Starting Bulkgen Server...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        "   Build Mode: {}",
        if cfg!(debug_assertions) {
            "Debug"
        } else {
            "Release"
        }
    );
    info!("   Environment: {}", config_manager.environment());
    if config_manager.is_production() && !config.database.enabled {
        warn!("⚠️ Running in production with the in-memory store; batches will not survive a restart");
    }

    let system = OrchestrationSystem::from_config(config)
        .await
        .context("Failed to bootstrap orchestration system")?;
    let app = create_app(AppState::new(system));

    let listener = TcpListener::bind(&config.web.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.web.bind_address))?;

    info!("🎉 Bulkgen Server listening on {}", config.web.bind_address);
    info!("   Press Ctrl+C to shutdown gracefully");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated unexpectedly")?;

    info!("👋 Bulkgen Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }

    info!("🛑 Shutdown signal received, draining in-flight requests...");
}
