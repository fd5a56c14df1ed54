#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Bulkgen Core
//!
//! Batch orchestration core for row-by-row bulk text generation.
//!
//! ## Overview
//!
//! A client submits a list of rows and an instruction template. The core records
//! one ledger entry per row, hands the batch to an external generation worker
//! on a detached task, and folds the per-row results the worker reports back
//! into the batch status. Clients poll for progress.
//!
//! Worker delivery is guarded by a retry policy with exponential backoff and a
//! circuit breaker shared across all batches.
//!
//! ## Module Organization
//!
//! - [`models`] - Batch and row ledger entry types
//! - [`ledger`] - Batch store and row ledger (in-memory and PostgreSQL)
//! - [`state_machine`] - Batch lifecycle transitions
//! - [`orchestration`] - Orchestrator, dispatcher, progress and status query
//! - [`resilience`] - Retry policy and circuit breaker
//! - [`template`] - `{{field}}` placeholder substitution
//! - [`worker`] - Generation worker interface and HTTP client
//! - [`web`] - axum HTTP surface
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bulkgen::config::BulkgenConfig;
//! use bulkgen::models::NewBatch;
//! use bulkgen::orchestration::OrchestrationSystem;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let system = OrchestrationSystem::from_config(&BulkgenConfig::default()).await?;
//!
//! let created = system
//!     .orchestrator
//!     .create_batch(NewBatch::new(
//!         "Write a one-line bio for {{name}}",
//!         vec![json!({"name": "Ada"}), json!({"name": "Grace"})],
//!     ))
//!     .await?;
//!
//! let status = system.status_query.get_status(created.batch_id).await?;
//! println!("{}", status.message);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! DATABASE_URL=postgresql://... cargo test -- --ignored   # PostgreSQL ledger tests
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod resilience;
pub mod state_machine;
pub mod template;
pub mod test_utils;
pub mod web;
pub mod worker;

pub use config::{BulkgenConfig, ConfigManager};
pub use constants::{status_groups, system, BatchStatus, RowStatus};
pub use error::{BulkgenError, Result};
pub use ledger::{BatchStore, InMemoryStore, PgStore, RowLedger, RowUpdate, RowUpdateOutcome};
pub use models::{Batch, BatchId, NewBatch, RowCounts, RowId, RowLedgerEntry};
pub use orchestration::{
    BatchOrchestrator, BatchStatusResponse, OrchestrationSystem, ProgressSnapshot,
    RowResultCallback, StatusQueryService, SubstitutionMode,
};
pub use resilience::{CircuitBreaker, CircuitBreakerManager, CircuitState, RetryPolicy};
pub use state_machine::{BatchEvent, BatchState, BatchStateMachine, RowState};
