//! # Dispatcher
//!
//! Delivers a batch to the generation worker. Every attempt goes through the
//! circuit breaker and carries its own network timeout; the retry policy wraps
//! the whole thing. A timeout counts as one failed attempt on both sides.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{BulkgenError, Result};
use crate::logging::log_dispatch_operation;
use crate::models::{Batch, RowLedgerEntry};
use crate::orchestration::SubstitutionMode;
use crate::resilience::{CircuitBreaker, CircuitBreakerError, RetryError, RetryEvent, RetryPolicy};
use crate::template;
use crate::worker::{DispatchAck, DispatchError, DispatchRequest, DispatchRow, GenerationWorker};

type AttemptError = CircuitBreakerError<DispatchError>;

#[derive(Clone)]
pub struct Dispatcher {
    worker: Arc<dyn GenerationWorker>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    request_timeout: Duration,
    substitution_mode: SubstitutionMode,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("breaker", &self.breaker.name())
            .field("retry", self.retry.config())
            .field("request_timeout", &self.request_timeout)
            .field("substitution_mode", &self.substitution_mode)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(
        worker: Arc<dyn GenerationWorker>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        request_timeout: Duration,
        substitution_mode: SubstitutionMode,
    ) -> Self {
        Self {
            worker,
            breaker,
            retry,
            request_timeout,
            substitution_mode,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn substitution_mode(&self) -> SubstitutionMode {
        self.substitution_mode
    }

    /// Payload for the non-terminal entries among `entries`
    pub fn build_request(&self, batch: &Batch, entries: &[RowLedgerEntry]) -> DispatchRequest {
        let pending: Vec<&RowLedgerEntry> = entries
            .iter()
            .filter(|entry| !entry.status.is_terminal())
            .collect();

        let rendered_instructions = match self.substitution_mode {
            SubstitutionMode::Worker => None,
            SubstitutionMode::Orchestrator => Some(
                pending
                    .iter()
                    .map(|entry| {
                        (
                            entry.id.to_string(),
                            template::render(&batch.instruction_template, &entry.input),
                        )
                    })
                    .collect::<BTreeMap<_, _>>(),
            ),
        };

        DispatchRequest {
            batch_id: batch.id,
            rows: pending
                .iter()
                .map(|entry| DispatchRow::new(entry.id.clone(), &entry.input))
                .collect(),
            instruction_template: batch.instruction_template.clone(),
            auxiliary_context: batch.auxiliary_context.clone(),
            requested_output_fields: batch.requested_output_fields.clone(),
            substitution: self.substitution_mode,
            rendered_instructions,
        }
    }

    /// Deliver the request, retrying transient failures.
    ///
    /// Returns `CircuitOpen` when the breaker refused the final attempt and
    /// `DispatchFailed` for everything else that did not end in an acknowledgement.
    pub async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchAck> {
        let batch_id = request.batch_id.to_string();
        let rows = request.rows.len();

        log_dispatch_operation("dispatch.started", &batch_id, rows, None, "sending", None);

        let result = self
            .retry
            .call_with_observer(
                || self.attempt(request),
                |error: &AttemptError| match error {
                    CircuitBreakerError::CircuitOpen { .. } => false,
                    CircuitBreakerError::OperationFailed(error) => error.is_retryable(),
                },
                |event: RetryEvent<'_, AttemptError>| {
                    let details = event.error.to_string();
                    log_dispatch_operation(
                        "dispatch.retry",
                        &batch_id,
                        rows,
                        Some(event.attempt),
                        "backing_off",
                        Some(&details),
                    );
                    Ok(())
                },
            )
            .await;

        match result {
            Ok(ack) => {
                log_dispatch_operation(
                    "dispatch.accepted",
                    &batch_id,
                    rows,
                    None,
                    "accepted",
                    Some(&format!("worker status {}", ack.status)),
                );
                Ok(ack)
            }
            Err(error) => Err(self.classify_failure(request, error)),
        }
    }

    async fn attempt(&self, request: &DispatchRequest) -> std::result::Result<DispatchAck, AttemptError> {
        let timeout = self.request_timeout;
        self.breaker
            .call(|| async move {
                match tokio::time::timeout(timeout, self.worker.dispatch(request)).await {
                    Ok(result) => result,
                    Err(_) => {
                        debug!(
                            batch_id = %request.batch_id,
                            timeout_ms = timeout.as_millis() as u64,
                            "Generation worker did not answer in time"
                        );
                        Err(DispatchError::Timeout(timeout))
                    }
                }
            })
            .await
    }

    fn classify_failure(&self, request: &DispatchRequest, error: RetryError<AttemptError>) -> BulkgenError {
        let attempts = error.attempts();
        match error.into_inner() {
            CircuitBreakerError::CircuitOpen { component } => {
                warn!(
                    batch_id = %request.batch_id,
                    component = %component,
                    attempts = attempts,
                    "⚡ Dispatch skipped: circuit breaker is open"
                );
                BulkgenError::CircuitOpen { component }
            }
            CircuitBreakerError::OperationFailed(error) => {
                let plural = if attempts == 1 { "" } else { "s" };
                BulkgenError::DispatchFailed {
                    batch_id: request.batch_id,
                    reason: format!("{error} (after {attempts} attempt{plural})"),
                }
            }
        }
    }
}
