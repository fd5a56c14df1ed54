//! # Structured Logging Module
//!
//! Environment-aware structured logging for the orchestration core. Console
//! output by default; JSON lines when `BULKGEN_LOG_FORMAT=json` (or the
//! telemetry config asks for it). `RUST_LOG` always overrides the level.

use std::sync::OnceLock;

use chrono::Utc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{ConfigManager, TelemetryConfig};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging using environment defaults
pub fn init_structured_logging() {
    let environment = ConfigManager::detect_environment();
    let telemetry = TelemetryConfig {
        log_level: default_log_level(&environment).to_string(),
        ..TelemetryConfig::default()
    };
    init_with_config(&telemetry);
}

/// Initialize structured logging from the telemetry section of the configuration.
/// Only the first call in a process has any effect.
pub fn init_with_config(telemetry: &TelemetryConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let json = log_format(telemetry) == "json";

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(telemetry.log_level.clone()));

        let layer = if json {
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(false)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .boxed()
        };

        // A subscriber may already be installed (tests, embedding applications)
        if tracing_subscriber::registry()
            .with(layer.with_filter(filter))
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            format = if json { "json" } else { "console" },
            "🔧 Structured logging initialized"
        );
    });
}

fn log_format(telemetry: &TelemetryConfig) -> String {
    std::env::var("BULKGEN_LOG_FORMAT")
        .unwrap_or_else(|_| telemetry.log_format.clone())
        .to_lowercase()
}

/// Default log level for an environment
fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}

/// Log structured data for batch lifecycle operations
pub fn log_batch_operation(
    operation: &str,
    batch_id: &str,
    status: &str,
    total_rows: Option<usize>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        batch_id = %batch_id,
        status = %status,
        total_rows = total_rows,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📦 BATCH_OPERATION"
    );
}

/// Log structured data for row ledger operations
pub fn log_row_operation(
    operation: &str,
    batch_id: &str,
    row_id: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::debug!(
        operation = %operation,
        batch_id = %batch_id,
        row_id = %row_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🧾 ROW_OPERATION"
    );
}

/// Log structured data for dispatch attempts against the generation worker
pub fn log_dispatch_operation(
    operation: &str,
    batch_id: &str,
    rows: usize,
    attempt: Option<u32>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        batch_id = %batch_id,
        rows = rows,
        attempt = attempt,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🚀 DISPATCH_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(default_log_level("test"), "warn");
        assert_eq!(default_log_level("development"), "debug");
        assert_eq!(default_log_level("production"), "info");
        assert_eq!(default_log_level("unknown"), "debug");
    }

    #[test]
    fn test_repeated_initialization_is_harmless() {
        init_structured_logging();
        init_with_config(&TelemetryConfig::default());
        log_batch_operation("batch.created", "batch-1", "pending", Some(2), None);
    }
}
