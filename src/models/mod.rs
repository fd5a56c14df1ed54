//! # Data Models
//!
//! Batch and row ledger records shared by the stores, the orchestrator and the
//! status query.

pub mod batch;
pub mod row_ledger_entry;

pub use batch::{Batch, BatchId, NewBatch, RowInput};
pub use row_ledger_entry::{RowCounts, RowId, RowLedgerEntry};
