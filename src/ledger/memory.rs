//! # In-Memory Store
//!
//! Process-local `BatchStore` + `RowLedger`. Row updates for different rows of
//! one batch never contend on a shared lock: each entry has its own mutex and
//! the batch-level completion counters are atomics.
//!
//! ```rust
//! use bulkgen::ledger::{BatchStore, InMemoryStore, RowLedger, RowUpdate};
//! use bulkgen::models::{Batch, BatchId, NewBatch, RowId};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryStore::new();
//! let batch_id = BatchId::new();
//! let request = NewBatch::new("Hello {{name}}", vec![json!({"name": "Ada"})]);
//!
//! store
//!     .insert_batch(&Batch::new_pending(batch_id, &request, 1, chrono::Utc::now()))
//!     .await?;
//! store
//!     .mark_pending(batch_id, vec![json!({"name": "Ada"}).as_object().cloned().unwrap()])
//!     .await?;
//!
//! let outcome = store
//!     .update_row(batch_id, &RowId::new(batch_id, 0), RowUpdate::success("Hello Ada"))
//!     .await?;
//! assert!(outcome.completed_batch(&RowUpdate::success("Hello Ada")));
//! # Ok::<(), bulkgen::BulkgenError>(())
//! # }).unwrap();
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use super::{BatchStore, RowLedger, RowUpdate, RowUpdateOutcome};
use crate::error::{BulkgenError, Result};
use crate::models::{Batch, BatchId, RowCounts, RowId, RowInput, RowLedgerEntry};
use crate::state_machine::{BatchState, RowState};

struct BatchLedger {
    entries: Vec<Mutex<RowLedgerEntry>>,
    remaining: AtomicUsize,
    error_rows: AtomicUsize,
}

impl BatchLedger {
    fn entry(&self, batch_id: BatchId, row_id: &RowId) -> Result<&Mutex<RowLedgerEntry>> {
        row_id
            .offset_within(batch_id)
            .and_then(|offset| self.entries.get(offset))
            .ok_or_else(|| BulkgenError::RowNotFound {
                batch_id,
                row_id: row_id.clone(),
            })
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    batches: DashMap<BatchId, Batch>,
    ledgers: DashMap<BatchId, Arc<BatchLedger>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("batches", &self.batches.len())
            .finish()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    fn ledger(&self, batch_id: BatchId) -> Option<Arc<BatchLedger>> {
        // Clone out of the shard so no map lock is held across row updates
        self.ledgers.get(&batch_id).map(|ledger| Arc::clone(&ledger))
    }
}

#[async_trait]
impl BatchStore for InMemoryStore {
    async fn insert_batch(&self, batch: &Batch) -> Result<()> {
        match self.batches.entry(batch.id) {
            Entry::Occupied(_) => Err(BulkgenError::DuplicateBatch { batch_id: batch.id }),
            Entry::Vacant(slot) => {
                slot.insert(batch.clone());
                Ok(())
            }
        }
    }

    async fn get_batch(&self, batch_id: BatchId) -> Result<Option<Batch>> {
        Ok(self.batches.get(&batch_id).map(|batch| batch.clone()))
    }

    async fn transition_batch(
        &self,
        batch_id: BatchId,
        expected: BatchState,
        next: BatchState,
        message: Option<String>,
    ) -> Result<Option<Batch>> {
        let Some(mut batch) = self.batches.get_mut(&batch_id) else {
            return Ok(None);
        };

        if batch.status != expected {
            return Ok(None);
        }

        batch.status = next;
        batch.message = message;
        batch.updated_at = Utc::now().max(batch.updated_at);
        Ok(Some(batch.clone()))
    }

    async fn delete_batch(&self, batch_id: BatchId) -> Result<bool> {
        self.ledgers.remove(&batch_id);
        Ok(self.batches.remove(&batch_id).is_some())
    }
}

#[async_trait]
impl RowLedger for InMemoryStore {
    async fn mark_pending(&self, batch_id: BatchId, rows: Vec<RowInput>) -> Result<Vec<RowLedgerEntry>> {
        if !self.batches.contains_key(&batch_id) {
            return Err(BulkgenError::BatchNotFound(batch_id));
        }

        let now = Utc::now();
        let entries: Vec<RowLedgerEntry> = rows
            .into_iter()
            .enumerate()
            .map(|(offset, input)| RowLedgerEntry::pending(batch_id, offset, input, now))
            .collect();

        match self.ledgers.entry(batch_id) {
            Entry::Occupied(_) => Err(BulkgenError::DuplicateBatch { batch_id }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(BatchLedger {
                    remaining: AtomicUsize::new(entries.len()),
                    error_rows: AtomicUsize::new(0),
                    entries: entries.iter().cloned().map(Mutex::new).collect(),
                }));
                debug!(batch_id = %batch_id, rows = entries.len(), "📒 Row ledger entries created");
                Ok(entries)
            }
        }
    }

    async fn update_row(
        &self,
        batch_id: BatchId,
        row_id: &RowId,
        update: RowUpdate,
    ) -> Result<RowUpdateOutcome> {
        let ledger = self.ledger(batch_id).ok_or_else(|| BulkgenError::RowNotFound {
            batch_id,
            row_id: row_id.clone(),
        })?;

        let mut entry = ledger.entry(batch_id, row_id)?.lock();
        if entry.status.is_terminal() {
            return Ok(RowUpdateOutcome::Unchanged {
                current: entry.status,
            });
        }

        entry.status = update.status;
        if let Some(output) = update.output {
            entry.output = output;
        }
        entry.error = if update.status == RowState::Error {
            update.error
        } else {
            None
        };
        entry.updated_at = Utc::now();

        if !update.status.is_terminal() {
            return Ok(RowUpdateOutcome::Applied {
                remaining: ledger.remaining.load(Ordering::SeqCst),
                error_rows: ledger.error_rows.load(Ordering::SeqCst),
            });
        }

        // The error count must be published before `remaining` drops, so whoever
        // observes zero also observes every error that preceded it.
        if update.status == RowState::Error {
            ledger.error_rows.fetch_add(1, Ordering::SeqCst);
        }
        let remaining = ledger.remaining.fetch_sub(1, Ordering::SeqCst) - 1;
        let error_rows = ledger.error_rows.load(Ordering::SeqCst);

        Ok(RowUpdateOutcome::Applied {
            remaining,
            error_rows,
        })
    }

    async fn list_rows(&self, batch_id: BatchId) -> Result<Vec<RowLedgerEntry>> {
        Ok(self
            .ledger(batch_id)
            .map(|ledger| ledger.entries.iter().map(|entry| entry.lock().clone()).collect())
            .unwrap_or_default())
    }

    async fn row_counts(&self, batch_id: BatchId) -> Result<RowCounts> {
        let Some(ledger) = self.ledger(batch_id) else {
            return Ok(RowCounts::default());
        };

        let mut counts = RowCounts::default();
        for entry in &ledger.entries {
            counts.record(entry.lock().status);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewBatch;
    use serde_json::json;

    async fn seeded_store(rows: usize) -> (Arc<InMemoryStore>, BatchId) {
        let store = Arc::new(InMemoryStore::new());
        let values: Vec<_> = (0..rows).map(|i| json!({ "n": i })).collect();
        let input = NewBatch::new("Row {{n}}", values.clone());
        let batch = Batch::new_pending(BatchId::new(), &input, rows, Utc::now());
        store.insert_batch(&batch).await.unwrap();
        let inputs = values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect();
        store.mark_pending(batch.id, inputs).await.unwrap();
        (store, batch.id)
    }

    #[tokio::test]
    async fn test_mark_pending_creates_ordered_entries() {
        let (store, batch_id) = seeded_store(3).await;
        let rows = store.list_rows(batch_id).await.unwrap();

        assert_eq!(rows.len(), 3);
        for (offset, row) in rows.iter().enumerate() {
            assert_eq!(row.row_offset, offset);
            assert_eq!(row.id, RowId::new(batch_id, offset));
            assert_eq!(row.status, RowState::Pending);
            assert_eq!(row.output, "");
        }
    }

    #[tokio::test]
    async fn test_mark_pending_twice_is_duplicate() {
        let (store, batch_id) = seeded_store(1).await;
        let result = store.mark_pending(batch_id, vec![RowInput::new()]).await;
        assert!(matches!(result, Err(BulkgenError::DuplicateBatch { .. })));
    }

    #[tokio::test]
    async fn test_update_row_is_set_if_not_terminal() {
        let (store, batch_id) = seeded_store(2).await;
        let row_id = RowId::new(batch_id, 0);

        let first = store
            .update_row(batch_id, &row_id, RowUpdate::success("hello"))
            .await
            .unwrap();
        assert_eq!(
            first,
            RowUpdateOutcome::Applied {
                remaining: 1,
                error_rows: 0
            }
        );

        let second = store
            .update_row(batch_id, &row_id, RowUpdate::error("late failure"))
            .await
            .unwrap();
        assert_eq!(
            second,
            RowUpdateOutcome::Unchanged {
                current: RowState::Success
            }
        );

        let rows = store.list_rows(batch_id).await.unwrap();
        assert_eq!(rows[0].output, "hello");
        assert_eq!(rows[0].error, None);
    }

    #[tokio::test]
    async fn test_update_unknown_row() {
        let (store, batch_id) = seeded_store(1).await;

        let out_of_range = store
            .update_row(batch_id, &RowId::new(batch_id, 5), RowUpdate::success("x"))
            .await;
        assert!(matches!(out_of_range, Err(BulkgenError::RowNotFound { .. })));

        // Row id of another batch
        let foreign = store
            .update_row(batch_id, &RowId::new(BatchId::new(), 0), RowUpdate::success("x"))
            .await;
        assert!(matches!(foreign, Err(BulkgenError::RowNotFound { .. })));
    }

    #[tokio::test]
    async fn test_exactly_one_update_observes_zero_remaining() {
        let (store, batch_id) = seeded_store(64).await;

        let handles: Vec<_> = (0..64)
            .map(|offset| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let update = if offset % 4 == 0 {
                        RowUpdate::error("bad row")
                    } else {
                        RowUpdate::success("ok")
                    };
                    store
                        .update_row(batch_id, &RowId::new(batch_id, offset), update)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut zero_observations = Vec::new();
        for handle in handles {
            if let RowUpdateOutcome::Applied {
                remaining: 0,
                error_rows,
            } = handle.await.unwrap()
            {
                zero_observations.push(error_rows);
            }
        }

        assert_eq!(zero_observations, vec![16]);
        let counts = store.row_counts(batch_id).await.unwrap();
        assert_eq!(counts.succeeded, 48);
        assert_eq!(counts.failed, 16);
    }

    #[tokio::test]
    async fn test_transition_batch_compare_and_swap() {
        let (store, batch_id) = seeded_store(1).await;

        let stale = store
            .transition_batch(batch_id, BatchState::Processing, BatchState::Completed, None)
            .await
            .unwrap();
        assert!(stale.is_none());

        let applied = store
            .transition_batch(batch_id, BatchState::Pending, BatchState::Processing, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(applied.status, BatchState::Processing);
    }

    #[tokio::test]
    async fn test_delete_batch_removes_entries() {
        let (store, batch_id) = seeded_store(2).await;
        assert!(store.delete_batch(batch_id).await.unwrap());
        assert!(store.get_batch(batch_id).await.unwrap().is_none());
        assert!(store.list_rows(batch_id).await.unwrap().is_empty());
        assert!(!store.delete_batch(batch_id).await.unwrap());
    }
}
