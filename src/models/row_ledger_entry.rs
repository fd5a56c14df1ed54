//! # Row Ledger Entry Model
//!
//! The per-row unit of work. Entries are created in bulk when the batch is
//! created and are never added or removed afterwards; only `status`, `output`
//! and `error` change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::batch::{BatchId, RowInput};
use crate::constants::system::ROW_ID_SEPARATOR;
use crate::state_machine::RowState;

/// Row identifier, derived deterministically from the batch id and row offset
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    pub fn new(batch_id: BatchId, offset: usize) -> Self {
        Self(format!("{batch_id}{ROW_ID_SEPARATOR}{offset}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Offset of this row if it belongs to `batch_id`
    pub fn offset_within(&self, batch_id: BatchId) -> Option<usize> {
        let prefix = format!("{batch_id}{ROW_ID_SEPARATOR}");
        let offset: usize = self.0.strip_prefix(&prefix)?.parse().ok()?;
        // Reject non-canonical spellings such as leading zeros
        (Self::new(batch_id, offset) == *self).then_some(offset)
    }
}

impl From<String> for RowId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowLedgerEntry {
    pub id: RowId,
    pub batch_id: BatchId,
    pub row_offset: usize,
    /// The original row's field map
    pub input: RowInput,
    /// Generated text; empty until the row succeeds
    pub output: String,
    pub status: RowState,
    /// Present only when `status` is `error`
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RowLedgerEntry {
    pub fn pending(batch_id: BatchId, row_offset: usize, input: RowInput, now: DateTime<Utc>) -> Self {
        Self {
            id: RowId::new(batch_id, row_offset),
            batch_id,
            row_offset,
            input,
            output: String::new(),
            status: RowState::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Per-status row tallies for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCounts {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RowCounts {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a RowLedgerEntry>) -> Self {
        entries
            .into_iter()
            .fold(Self::default(), |mut counts, entry| {
                counts.record(entry.status);
                counts
            })
    }

    pub fn record(&mut self, status: RowState) {
        self.total += 1;
        match status {
            RowState::Pending => self.pending += 1,
            RowState::Processing => self.processing += 1,
            RowState::Success => self.succeeded += 1,
            RowState::Error => self.failed += 1,
        }
    }

    /// Rows that reached a terminal status
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn non_terminal(&self) -> usize {
        self.pending + self.processing
    }

    pub fn all_terminal(&self) -> bool {
        self.total > 0 && self.non_terminal() == 0
    }
}
