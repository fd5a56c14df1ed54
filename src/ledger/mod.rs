//! # Row Ledger and Batch Store
//!
//! Storage seams for the orchestrator. `BatchStore` owns batch records and their
//! status transitions; `RowLedger` owns the per-row entries and the per-batch
//! completion counters that drive finalization.
//!
//! Both traits are implemented by [`memory::InMemoryStore`] and
//! [`postgres::PgStore`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Batch, BatchId, RowCounts, RowId, RowInput, RowLedgerEntry};
use crate::state_machine::{BatchState, RowState};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Batch record persistence
#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn insert_batch(&self, batch: &Batch) -> Result<()>;

    async fn get_batch(&self, batch_id: BatchId) -> Result<Option<Batch>>;

    /// Compare-and-swap status write.
    ///
    /// Moves the batch from `expected` to `next`, replaces `message` and bumps
    /// `updated_at`. Returns `None` when the stored status no longer equals
    /// `expected` (or the batch is gone); the caller re-reads and re-evaluates.
    async fn transition_batch(
        &self,
        batch_id: BatchId,
        expected: BatchState,
        next: BatchState,
        message: Option<String>,
    ) -> Result<Option<Batch>>;

    /// Remove the batch together with its ledger entries. Returns whether it existed.
    async fn delete_batch(&self, batch_id: BatchId) -> Result<bool>;
}

/// Terminal (or progress) status reported for a single row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowUpdate {
    pub status: RowState,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl RowUpdate {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: RowState::Success,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            status: RowState::Error,
            output: None,
            error: Some(error.into()),
        }
    }

    pub fn processing() -> Self {
        Self {
            status: RowState::Processing,
            output: None,
            error: None,
        }
    }
}

/// Result of a conditional row update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowUpdateOutcome {
    /// The entry changed. Counters are read after this update was accounted for.
    Applied { remaining: usize, error_rows: usize },
    /// The entry was already terminal; nothing was written.
    Unchanged { current: RowState },
}

impl RowUpdateOutcome {
    /// True for exactly one update per batch: the one that took `remaining` to zero
    pub fn completed_batch(&self, update: &RowUpdate) -> bool {
        matches!(self, Self::Applied { remaining: 0, .. }) && update.status.is_terminal()
    }
}

/// Per-row work ledger
#[async_trait]
pub trait RowLedger: Send + Sync {
    /// Bulk-create one pending entry per row, ids derived from the row offset.
    async fn mark_pending(&self, batch_id: BatchId, rows: Vec<RowInput>) -> Result<Vec<RowLedgerEntry>>;

    /// Set-if-not-terminal update of a single entry.
    async fn update_row(
        &self,
        batch_id: BatchId,
        row_id: &RowId,
        update: RowUpdate,
    ) -> Result<RowUpdateOutcome>;

    /// Entries of the batch in creation order
    async fn list_rows(&self, batch_id: BatchId) -> Result<Vec<RowLedgerEntry>>;

    async fn row_counts(&self, batch_id: BatchId) -> Result<RowCounts>;
}
