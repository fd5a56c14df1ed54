//! # System Constants
//!
//! Core constants and status groupings that define the operational boundaries of
//! batch orchestration.

pub use crate::state_machine::{BatchState as BatchStatus, RowState as RowStatus};

/// Lifecycle events, used as the `operation` field of structured log lines
pub mod events {
    pub const BATCH_CREATED: &str = "batch.created";
    pub const BATCH_DISPATCH_REQUESTED: &str = "batch.dispatch_requested";
    pub const BATCH_DISPATCH_ACCEPTED: &str = "batch.dispatch_accepted";
    pub const BATCH_DISPATCH_FAILED: &str = "batch.dispatch_failed";
    pub const BATCH_COMPLETED: &str = "batch.completed";
    pub const BATCH_CANCELLED: &str = "batch.cancelled";
    pub const BATCH_RESUMED: &str = "batch.resumed";

    pub const ROW_RESULT_RECORDED: &str = "row.result_recorded";
    pub const ROW_RESULT_DUPLICATE: &str = "row.result_duplicate";
}

/// Named external dependencies, one circuit breaker each
pub mod components {
    pub const GENERATION_WORKER: &str = "generation_worker";
}

/// Groupings of batch states used by guards and queries
pub mod status_groups {
    use super::BatchStatus;

    /// States in which rows are still expected to complete
    pub const ACTIVE_STATES: &[BatchStatus] = &[BatchStatus::Pending, BatchStatus::Processing];

    /// States from which `resume` is permitted
    pub const RESUMABLE_STATES: &[BatchStatus] = &[BatchStatus::Cancelled, BatchStatus::Failed];

    pub const FINISHED_STATES: &[BatchStatus] = &[
        BatchStatus::Completed,
        BatchStatus::CompletedWithErrors,
        BatchStatus::Failed,
        BatchStatus::Cancelled,
    ];
}

pub mod system {
    /// Separator between the batch id and the row offset in a row id
    pub const ROW_ID_SEPARATOR: &str = "-row-";

    /// Upper bound on random jitter added to each backoff delay
    pub const MAX_JITTER_FRACTION: f64 = 0.1;

    /// CAS attempts before a contended status transition gives up
    pub const MAX_TRANSITION_ATTEMPTS: u32 = 8;

    pub const DEFAULT_MAX_ROWS_PER_BATCH: usize = 50_000;
}
