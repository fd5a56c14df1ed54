//! # Batch Orchestrator
//!
//! Owns the batch lifecycle: validates and records new batches, hands them to
//! the generation worker on a detached task, and folds per-row results back
//! into the batch status.
//!
//! ## Dispatch path
//!
//! `create_batch` and `resume` return before the worker is contacted. The
//! spawned task writes its outcome to the batch record (`processing` on
//! acknowledgement, `failed` with a message otherwise); nothing is propagated
//! to the original caller.
//!
//! ## Finalization
//!
//! The row ledger reports how many rows remain after each applied update.
//! Exactly one update observes zero, and that caller finalizes the batch.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::constants::{events, status_groups};
use crate::error::{BulkgenError, Result};
use crate::ledger::{BatchStore, RowLedger, RowUpdate, RowUpdateOutcome};
use crate::logging::{log_batch_operation, log_error, log_row_operation};
use crate::models::{Batch, BatchId, NewBatch, RowCounts, RowInput};
use crate::orchestration::dispatcher::Dispatcher;
use crate::orchestration::types::{BatchCreated, DispatchHandle, ResumeOutcome, RowResultCallback};
use crate::state_machine::{BatchEvent, BatchState, BatchStateMachine, RowState, TransitionOutcome};
use crate::template;

#[derive(Clone)]
pub struct BatchOrchestrator {
    batches: Arc<dyn BatchStore>,
    ledger: Arc<dyn RowLedger>,
    state_machine: BatchStateMachine,
    dispatcher: Dispatcher,
    max_rows_per_batch: usize,
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("dispatcher", &self.dispatcher)
            .field("max_rows_per_batch", &self.max_rows_per_batch)
            .finish()
    }
}

impl BatchOrchestrator {
    pub fn new(
        batches: Arc<dyn BatchStore>,
        ledger: Arc<dyn RowLedger>,
        dispatcher: Dispatcher,
        max_rows_per_batch: usize,
    ) -> Self {
        Self {
            state_machine: BatchStateMachine::new(batches.clone()),
            batches,
            ledger,
            dispatcher,
            max_rows_per_batch,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn state_machine(&self) -> &BatchStateMachine {
        &self.state_machine
    }

    /// Record a new batch with one pending ledger entry per row and start
    /// dispatching it in the background.
    pub async fn create_batch(&self, request: NewBatch) -> Result<BatchCreated> {
        let rows = self.validate(&request)?;
        let total_rows = rows.len();

        let batch = Batch::new_pending(BatchId::new(), &request, total_rows, Utc::now());
        let batch_id = batch.id;

        if let Some(first) = rows.first() {
            let missing = template::missing_fields(&request.instruction_template, first);
            if !missing.is_empty() {
                warn!(
                    batch_id = %batch_id,
                    missing_fields = ?missing,
                    "Template references fields absent from the first row; placeholders will stay literal"
                );
            }
        }

        self.batches.insert_batch(&batch).await?;

        if let Err(error) = self.ledger.mark_pending(batch_id, rows).await {
            // Leave no ledger-less batch behind
            if let Err(cleanup_error) = self.batches.delete_batch(batch_id).await {
                log_error(
                    "batch_orchestrator",
                    "create_batch.cleanup",
                    &cleanup_error.to_string(),
                    Some(&batch_id.to_string()),
                );
            }
            return Err(error);
        }

        log_batch_operation(
            events::BATCH_CREATED,
            &batch_id.to_string(),
            BatchState::Pending.as_str(),
            Some(total_rows),
            None,
        );

        Ok(BatchCreated {
            batch_id,
            total_rows,
            dispatch: self.spawn_dispatch(batch_id),
        })
    }

    fn validate(&self, request: &NewBatch) -> Result<Vec<RowInput>> {
        if request.instruction_template.trim().is_empty() {
            return Err(BulkgenError::validation("instruction template must not be empty"));
        }
        if request.rows.is_empty() {
            return Err(BulkgenError::validation("rows must not be empty"));
        }
        if request.rows.len() > self.max_rows_per_batch {
            return Err(BulkgenError::validation(format!(
                "batch has {} rows; at most {} are allowed",
                request.rows.len(),
                self.max_rows_per_batch
            )));
        }

        request
            .rows
            .iter()
            .enumerate()
            .map(|(offset, row)| {
                row.as_object().cloned().ok_or_else(|| {
                    BulkgenError::validation(format!("row {offset} must be a JSON object"))
                })
            })
            .collect()
    }

    fn spawn_dispatch(&self, batch_id: BatchId) -> DispatchHandle {
        log_batch_operation(
            events::BATCH_DISPATCH_REQUESTED,
            &batch_id.to_string(),
            BatchState::Pending.as_str(),
            None,
            None,
        );

        let orchestrator = self.clone();
        DispatchHandle::new(tokio::spawn(async move {
            if let Err(error) = orchestrator.run_dispatch(batch_id).await {
                log_error(
                    "batch_orchestrator",
                    "dispatch",
                    &error.to_string(),
                    Some(&batch_id.to_string()),
                );
            }
        }))
    }

    /// Body of the detached dispatch task
    async fn run_dispatch(&self, batch_id: BatchId) -> Result<()> {
        let Some(batch) = self.batches.get_batch(batch_id).await? else {
            warn!(batch_id = %batch_id, "Batch disappeared before dispatch");
            return Ok(());
        };

        if batch.status != BatchState::Pending {
            debug!(
                batch_id = %batch_id,
                status = %batch.status,
                "Batch no longer pending, skipping dispatch"
            );
            return Ok(());
        }

        let entries = self.ledger.list_rows(batch_id).await?;
        let counts = RowCounts::from_entries(&entries);
        if counts.all_terminal() {
            self.finalize(batch_id, counts.failed).await?;
            return Ok(());
        }

        let request = self.dispatcher.build_request(&batch, &entries);
        match self.dispatcher.dispatch(&request).await {
            Ok(_) => self.mark_accepted(batch_id, request.rows.len()).await,
            Err(error) => self.mark_failed(batch_id, &error).await,
        }
    }

    async fn mark_accepted(&self, batch_id: BatchId, rows: usize) -> Result<()> {
        match self
            .state_machine
            .transition(batch_id, BatchEvent::DispatchAccepted)
            .await
        {
            Ok(outcome) => {
                log_batch_operation(
                    events::BATCH_DISPATCH_ACCEPTED,
                    &batch_id.to_string(),
                    outcome.to.as_str(),
                    Some(rows),
                    None,
                );
                Ok(())
            }
            // Cancelled, or already finalized by a fast worker, while the call was in flight
            Err(BulkgenError::InvalidStateTransition { reason, .. }) => {
                info!(
                    batch_id = %batch_id,
                    reason = %reason,
                    "Worker accepted a batch that has since moved on; keeping its status"
                );
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn mark_failed(&self, batch_id: BatchId, error: &BulkgenError) -> Result<()> {
        let message = failure_message(error);

        match self
            .state_machine
            .transition(batch_id, BatchEvent::fail_with_error(message.clone()))
            .await
        {
            Ok(outcome) => {
                if matches!(error, BulkgenError::CircuitOpen { .. }) {
                    warn!(
                        batch_id = %batch_id,
                        error = %error,
                        "⚡ Batch failed without dispatch: generation worker circuit is open"
                    );
                }
                log_batch_operation(
                    events::BATCH_DISPATCH_FAILED,
                    &batch_id.to_string(),
                    outcome.to.as_str(),
                    None,
                    Some(&message),
                );
                Ok(())
            }
            Err(BulkgenError::InvalidStateTransition { reason, .. }) => {
                info!(
                    batch_id = %batch_id,
                    reason = %reason,
                    dispatch_error = %error,
                    "Dispatch failed for a batch that has since moved on; keeping its status"
                );
                Ok(())
            }
            Err(transition_error) => Err(transition_error),
        }
    }

    /// Move an active batch to completed or completed_with_errors.
    /// Returns `None` when the batch is not in a state that finalizes.
    async fn finalize(&self, batch_id: BatchId, error_rows: usize) -> Result<Option<TransitionOutcome>> {
        match self
            .state_machine
            .transition(batch_id, BatchEvent::Finalize { error_rows })
            .await
        {
            Ok(outcome) => {
                log_batch_operation(
                    events::BATCH_COMPLETED,
                    &batch_id.to_string(),
                    outcome.to.as_str(),
                    Some(outcome.batch.total_rows),
                    Some(&format!("{error_rows} rows reported errors")),
                );
                Ok(Some(outcome))
            }
            Err(BulkgenError::InvalidStateTransition { reason, .. }) => {
                debug!(
                    batch_id = %batch_id,
                    reason = %reason,
                    "Every row is terminal but the batch is not active; not finalizing"
                );
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Stop a pending or processing batch. Rows are left as they are so a later
    /// `resume` can pick them up. Cancelling a cancelled batch is a no-op.
    pub async fn cancel(&self, batch_id: BatchId) -> Result<Batch> {
        let batch = self
            .batches
            .get_batch(batch_id)
            .await?
            .ok_or(BulkgenError::BatchNotFound(batch_id))?;

        if batch.status == BatchState::Cancelled {
            return Ok(batch);
        }

        match self.state_machine.transition(batch_id, BatchEvent::Cancel).await {
            Ok(outcome) => {
                log_batch_operation(
                    events::BATCH_CANCELLED,
                    &batch_id.to_string(),
                    outcome.to.as_str(),
                    Some(outcome.batch.total_rows),
                    None,
                );
                Ok(outcome.batch)
            }
            Err(error @ BulkgenError::InvalidStateTransition { .. }) => {
                // A concurrent cancel may have won the race
                match self.batches.get_batch(batch_id).await? {
                    Some(current) if current.status == BatchState::Cancelled => Ok(current),
                    _ => Err(error),
                }
            }
            Err(error) => Err(error),
        }
    }

    /// Re-open a cancelled or failed batch and dispatch only its unfinished rows.
    pub async fn resume(&self, batch_id: BatchId) -> Result<ResumeOutcome> {
        let resumed = self.state_machine.transition(batch_id, BatchEvent::Resume).await?;
        let counts = self.ledger.row_counts(batch_id).await?;

        log_batch_operation(
            events::BATCH_RESUMED,
            &batch_id.to_string(),
            resumed.to.as_str(),
            Some(resumed.batch.total_rows),
            Some(&format!("{} rows left to generate", counts.non_terminal())),
        );

        if counts.all_terminal() {
            let batch = match self.finalize(batch_id, counts.failed).await? {
                Some(outcome) => outcome.batch,
                None => self
                    .batches
                    .get_batch(batch_id)
                    .await?
                    .ok_or(BulkgenError::BatchNotFound(batch_id))?,
            };
            return Ok(ResumeOutcome {
                batch,
                redispatched_rows: 0,
                dispatch: None,
            });
        }

        Ok(ResumeOutcome {
            batch: resumed.batch,
            redispatched_rows: counts.non_terminal(),
            dispatch: Some(self.spawn_dispatch(batch_id)),
        })
    }

    /// Apply one row result reported by the worker.
    ///
    /// Repeated results for a row that is already terminal leave it unchanged.
    /// The result that completes the last row finalizes the batch, unless the
    /// batch is no longer active.
    pub async fn record_row_result(&self, callback: RowResultCallback) -> Result<RowUpdateOutcome> {
        let RowResultCallback {
            batch_id,
            row_id,
            status,
            output,
            error,
        } = callback;

        if status == RowState::Pending {
            return Err(BulkgenError::validation(
                "row result status must be processing, success or error",
            ));
        }

        let batch = self
            .batches
            .get_batch(batch_id)
            .await?
            .ok_or(BulkgenError::BatchNotFound(batch_id))?;

        if row_id.offset_within(batch_id).is_none() {
            return Err(BulkgenError::RowNotFound { batch_id, row_id });
        }

        let update = RowUpdate {
            status,
            output,
            error,
        };
        let outcome = self.ledger.update_row(batch_id, &row_id, update.clone()).await?;

        match outcome {
            RowUpdateOutcome::Applied { remaining, .. } => log_row_operation(
                events::ROW_RESULT_RECORDED,
                &batch_id.to_string(),
                row_id.as_str(),
                status.as_str(),
                Some(&format!("{remaining} rows remaining")),
            ),
            RowUpdateOutcome::Unchanged { current } => log_row_operation(
                events::ROW_RESULT_DUPLICATE,
                &batch_id.to_string(),
                row_id.as_str(),
                current.as_str(),
                Some("row already terminal"),
            ),
        }

        if outcome.completed_batch(&update) {
            if let RowUpdateOutcome::Applied { error_rows, .. } = outcome {
                if !status_groups::ACTIVE_STATES.contains(&batch.status) {
                    debug!(
                        batch_id = %batch_id,
                        status = %batch.status,
                        "Last row landed on an inactive batch"
                    );
                }
                self.finalize(batch_id, error_rows).await?;
            }
        }

        Ok(outcome)
    }
}

/// Human-readable reason stored on a batch whose dispatch failed
fn failure_message(error: &BulkgenError) -> String {
    match error {
        BulkgenError::CircuitOpen { component } => format!(
            "Generation worker unavailable (circuit breaker open for {component}); dispatch was not attempted"
        ),
        BulkgenError::DispatchFailed { reason, .. } => {
            format!("Dispatch to generation worker failed: {reason}")
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryStore;
    use crate::orchestration::SubstitutionMode;
    use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy, RetryPolicyConfig};
    use crate::test_utils::MockGenerationWorker;
    use serde_json::json;
    use std::time::Duration;

    fn orchestrator(worker: &MockGenerationWorker) -> (BatchOrchestrator, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let dispatcher = Dispatcher::new(
            Arc::new(worker.clone()),
            Arc::new(CircuitBreaker::new(
                "generation_worker",
                CircuitBreakerConfig::for_generation_worker(),
            )),
            RetryPolicy::new(RetryPolicyConfig {
                max_attempts: 2,
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                multiplier: 2.0,
            }),
            Duration::from_secs(5),
            SubstitutionMode::Worker,
        );
        let orchestrator = BatchOrchestrator::new(store.clone(), store.clone(), dispatcher, 3);
        (orchestrator, store)
    }

    fn rows(count: usize) -> Vec<serde_json::Value> {
        (0..count).map(|i| json!({"name": format!("user-{i}")})).collect()
    }

    #[tokio::test]
    async fn test_validation_rejects_before_writing() {
        let worker = MockGenerationWorker::new();
        let (orchestrator, store) = orchestrator(&worker);

        let cases = vec![
            NewBatch::new("   ", rows(1)),
            NewBatch::new("Hi {{name}}", Vec::new()),
            NewBatch::new("Hi {{name}}", rows(4)),
            NewBatch::new("Hi {{name}}", vec![json!({"name": "a"}), json!("not an object")]),
        ];

        for request in cases {
            let error = orchestrator.create_batch(request).await.unwrap_err();
            assert!(matches!(error, BulkgenError::ValidationError(_)), "{error:?}");
        }
        assert_eq!(store.batch_count(), 0);
        assert_eq!(worker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_create_then_accept() {
        let worker = MockGenerationWorker::new();
        let (orchestrator, store) = orchestrator(&worker);

        let created = orchestrator
            .create_batch(NewBatch::new("Hi {{name}}", rows(3)))
            .await
            .unwrap();
        assert_eq!(created.total_rows, 3);

        created.dispatch.join().await.unwrap();
        let batch = store.get_batch(created.batch_id).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchState::Processing);
        assert_eq!(worker.last_call().unwrap().rows.len(), 3);
    }

    #[tokio::test]
    async fn test_pending_status_in_callback_is_rejected() {
        let worker = MockGenerationWorker::new();
        let (orchestrator, _store) = orchestrator(&worker);
        let created = orchestrator
            .create_batch(NewBatch::new("Hi {{name}}", rows(1)))
            .await
            .unwrap();

        let error = orchestrator
            .record_row_result(RowResultCallback {
                batch_id: created.batch_id,
                row_id: crate::models::RowId::new(created.batch_id, 0),
                status: RowState::Pending,
                output: None,
                error: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(error, BulkgenError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_row_from_other_batch_is_not_found() {
        let worker = MockGenerationWorker::new();
        let (orchestrator, _store) = orchestrator(&worker);
        let first = orchestrator
            .create_batch(NewBatch::new("Hi {{name}}", rows(1)))
            .await
            .unwrap();
        let second = orchestrator
            .create_batch(NewBatch::new("Hi {{name}}", rows(1)))
            .await
            .unwrap();

        let error = orchestrator
            .record_row_result(RowResultCallback::success(
                first.batch_id,
                crate::models::RowId::new(second.batch_id, 0),
                "text",
            ))
            .await
            .unwrap_err();
        assert!(matches!(error, BulkgenError::RowNotFound { .. }));
    }

    #[test]
    fn test_failure_messages_distinguish_open_circuit() {
        let open = failure_message(&BulkgenError::CircuitOpen {
            component: "generation_worker".to_string(),
        });
        assert!(open.contains("circuit breaker open"));

        let failed = failure_message(&BulkgenError::DispatchFailed {
            batch_id: BatchId::new(),
            reason: "status 500 (after 3 attempts)".to_string(),
        });
        assert!(failed.starts_with("Dispatch to generation worker failed"));
        assert!(!failed.contains("circuit"));
    }
}
