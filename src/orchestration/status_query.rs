//! # Status Query Service
//!
//! Read-only view of a batch for polling clients. Always answers with a
//! human-readable message; raw errors never reach the response.

use std::sync::Arc;

use chrono::Utc;

use crate::error::{BulkgenError, Result};
use crate::ledger::{BatchStore, RowLedger};
use crate::models::{Batch, BatchId, RowCounts};
use crate::orchestration::progress::ProgressSnapshot;
use crate::orchestration::types::{BatchStatusResponse, RowView};
use crate::state_machine::BatchState;

#[derive(Clone)]
pub struct StatusQueryService {
    batches: Arc<dyn BatchStore>,
    ledger: Arc<dyn RowLedger>,
}

impl std::fmt::Debug for StatusQueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusQueryService").finish_non_exhaustive()
    }
}

impl StatusQueryService {
    pub fn new(batches: Arc<dyn BatchStore>, ledger: Arc<dyn RowLedger>) -> Self {
        Self { batches, ledger }
    }

    pub async fn get_status(&self, batch_id: BatchId) -> Result<BatchStatusResponse> {
        let batch = self
            .batches
            .get_batch(batch_id)
            .await?
            .ok_or(BulkgenError::BatchNotFound(batch_id))?;

        let entries = self.ledger.list_rows(batch_id).await?;
        let counts = RowCounts::from_entries(&entries);
        let progress = ProgressSnapshot::compute(&batch, &counts, Utc::now());

        Ok(BatchStatusResponse {
            batch_id,
            status: batch.status,
            total_rows: batch.total_rows,
            processed_rows: progress.processed,
            error_rows: progress.failed,
            progress_percent: progress.percent,
            eta_seconds: progress.eta_seconds.filter(|_| batch.status.is_active()),
            message: status_message(&batch, &progress),
            created_at: batch.created_at,
            updated_at: batch.updated_at,
            rows: entries
                .into_iter()
                .map(|entry| RowView {
                    id: entry.id,
                    input: entry.input,
                    output: entry.output,
                    status: entry.status,
                    error: entry.error,
                })
                .collect(),
        })
    }
}

/// One-line description of where the batch stands
pub fn status_message(batch: &Batch, progress: &ProgressSnapshot) -> String {
    match batch.status {
        BatchState::Pending => "Waiting to start processing".to_string(),
        BatchState::Processing => format!("Processing: {}% complete", progress.percent),
        BatchState::Completed => "Batch completed successfully".to_string(),
        BatchState::CompletedWithErrors => {
            let plural = if progress.failed == 1 { "" } else { "s" };
            format!("Batch completed with {} error{plural}", progress.failed)
        }
        BatchState::Failed => match batch.message.as_deref().filter(|m| !m.trim().is_empty()) {
            Some(reason) => format!("Batch failed to process: {reason}"),
            None => "Batch failed to process".to_string(),
        },
        BatchState::Cancelled => format!("Batch cancelled at {}% complete", progress.percent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{InMemoryStore, RowUpdate};
    use crate::models::{NewBatch, RowId};
    use serde_json::json;

    async fn seeded(rows: usize) -> (StatusQueryService, Arc<InMemoryStore>, BatchId) {
        let store = Arc::new(InMemoryStore::new());
        let request = NewBatch::new("Summarize {{title}}", vec![json!({"title": "t"}); rows]);
        let batch = Batch::new_pending(BatchId::new(), &request, rows, Utc::now());
        store.insert_batch(&batch).await.unwrap();
        let inputs = request
            .rows
            .iter()
            .map(|row| row.as_object().cloned().unwrap())
            .collect();
        store.mark_pending(batch.id, inputs).await.unwrap();
        (StatusQueryService::new(store.clone(), store.clone()), store, batch.id)
    }

    #[tokio::test]
    async fn test_unknown_batch() {
        let (service, _store, _) = seeded(1).await;
        let missing = BatchId::new();
        assert_eq!(
            service.get_status(missing).await.unwrap_err(),
            BulkgenError::BatchNotFound(missing)
        );
    }

    #[tokio::test]
    async fn test_pending_batch_view() {
        let (service, _store, batch_id) = seeded(2).await;
        let status = service.get_status(batch_id).await.unwrap();

        assert_eq!(status.status, BatchState::Pending);
        assert_eq!(status.total_rows, 2);
        assert_eq!(status.processed_rows, 0);
        assert_eq!(status.progress_percent, 0);
        assert_eq!(status.eta_seconds, None);
        assert_eq!(status.message, "Waiting to start processing");
        assert_eq!(status.rows.len(), 2);
        assert_eq!(status.rows[1].id, RowId::new(batch_id, 1));
    }

    #[tokio::test]
    async fn test_processing_message_tracks_percent() {
        let (service, store, batch_id) = seeded(4).await;
        store
            .transition_batch(batch_id, BatchState::Pending, BatchState::Processing, None)
            .await
            .unwrap();
        store
            .update_row(batch_id, &RowId::new(batch_id, 0), RowUpdate::success("done"))
            .await
            .unwrap();

        let status = service.get_status(batch_id).await.unwrap();
        assert_eq!(status.processed_rows, 1);
        assert_eq!(status.progress_percent, 25);
        assert_eq!(status.message, "Processing: 25% complete");
        assert_eq!(status.rows[0].output, "done");
    }

    #[tokio::test]
    async fn test_failed_batch_reports_reason() {
        let (service, store, batch_id) = seeded(1).await;
        store
            .transition_batch(
                batch_id,
                BatchState::Pending,
                BatchState::Failed,
                Some("worker rejected the payload".to_string()),
            )
            .await
            .unwrap();

        let status = service.get_status(batch_id).await.unwrap();
        assert_eq!(status.message, "Batch failed to process: worker rejected the payload");
    }

    #[test]
    fn test_terminal_messages() {
        let now = Utc::now();
        let request = NewBatch::new("x", vec![json!({}); 3]);
        let mut batch = Batch::new_pending(BatchId::new(), &request, 3, now);
        let counts = RowCounts {
            total: 3,
            pending: 0,
            processing: 0,
            succeeded: 1,
            failed: 2,
        };
        let progress = ProgressSnapshot::compute(&batch, &counts, now);

        batch.status = BatchState::CompletedWithErrors;
        assert_eq!(status_message(&batch, &progress), "Batch completed with 2 errors");
        batch.status = BatchState::Completed;
        assert_eq!(status_message(&batch, &progress), "Batch completed successfully");
        batch.status = BatchState::Cancelled;
        assert_eq!(status_message(&batch, &progress), "Batch cancelled at 100% complete");
        batch.status = BatchState::Failed;
        assert_eq!(status_message(&batch, &progress), "Batch failed to process");
    }
}
