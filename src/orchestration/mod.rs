//! # Orchestration Engine
//!
//! Batch lifecycle coordination on top of the row ledger and resilience layers.
//!
//! ## Core Components
//!
//! - **BatchOrchestrator**: creates batches, spawns dispatch, applies row results,
//!   cancels and resumes
//! - **Dispatcher**: worker delivery through the circuit breaker and retry policy
//! - **ProgressSnapshot**: completion percentage, throughput and ETA
//! - **StatusQueryService**: read-only polling view
//! - **OrchestrationSystem**: configuration-driven wiring of all of the above

pub mod batch_orchestrator;
pub mod bootstrap;
pub mod dispatcher;
pub mod progress;
pub mod status_query;
pub mod types;

pub use batch_orchestrator::BatchOrchestrator;
pub use bootstrap::{OrchestrationSystem, StorageBackend, SystemStatus};
pub use dispatcher::Dispatcher;
pub use progress::ProgressSnapshot;
pub use status_query::StatusQueryService;
pub use types::{
    BatchCreated, BatchStatusResponse, DispatchHandle, ResumeOutcome, RowResultCallback, RowView,
    SubstitutionMode,
};
