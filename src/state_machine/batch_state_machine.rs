use std::sync::Arc;

use tracing::debug;

use super::{
    errors::{StateMachineError, StateMachineResult},
    events::BatchEvent,
    states::BatchState,
};
use crate::constants::system::MAX_TRANSITION_ATTEMPTS;
use crate::error::Result;
use crate::ledger::BatchStore;
use crate::models::{Batch, BatchId};

/// Result of an applied transition
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub from: BatchState,
    pub to: BatchState,
    /// The batch record as persisted after the transition
    pub batch: Batch,
}

/// Batch lifecycle state machine backed by compare-and-swap status writes
#[derive(Clone)]
pub struct BatchStateMachine {
    store: Arc<dyn BatchStore>,
}

impl BatchStateMachine {
    pub fn new(store: Arc<dyn BatchStore>) -> Self {
        Self { store }
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        batch_id: BatchId,
        current_state: BatchState,
        event: &BatchEvent,
    ) -> StateMachineResult<BatchState> {
        let target = match (current_state, event) {
            (BatchState::Pending, BatchEvent::DispatchAccepted) => BatchState::Processing,

            // A fast worker can report every row before the acknowledgement lands
            (BatchState::Pending | BatchState::Processing, BatchEvent::Finalize { error_rows }) => {
                if *error_rows == 0 {
                    BatchState::Completed
                } else {
                    BatchState::CompletedWithErrors
                }
            }

            (BatchState::Pending | BatchState::Processing, BatchEvent::Fail(_)) => {
                BatchState::Failed
            }

            (BatchState::Pending | BatchState::Processing, BatchEvent::Cancel) => {
                BatchState::Cancelled
            }

            (BatchState::Cancelled | BatchState::Failed, BatchEvent::Resume) => BatchState::Pending,

            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    batch_id,
                    from,
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Get the current state of the batch
    pub async fn current_state(&self, batch_id: BatchId) -> Result<BatchState> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or(StateMachineError::BatchNotFound(batch_id))?;
        Ok(batch.status)
    }

    /// Apply `event` to the batch, re-reading and re-evaluating when a concurrent
    /// writer changes the status between the read and the conditional write.
    pub async fn transition(
        &self,
        batch_id: BatchId,
        event: BatchEvent,
    ) -> Result<TransitionOutcome> {
        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let batch = self
                .store
                .get_batch(batch_id)
                .await?
                .ok_or(StateMachineError::BatchNotFound(batch_id))?;

            let from = batch.status;
            let to = Self::determine_target_state(batch_id, from, &event)?;
            let message = event.error_message().map(str::to_string);

            match self
                .store
                .transition_batch(batch_id, from, to, message)
                .await?
            {
                Some(updated) => {
                    debug!(
                        batch_id = %batch_id,
                        from = %from,
                        to = %to,
                        event = event.event_type(),
                        "🔄 Batch state transition applied"
                    );
                    return Ok(TransitionOutcome {
                        from,
                        to,
                        batch: updated,
                    });
                }
                None => {
                    debug!(
                        batch_id = %batch_id,
                        attempt = attempt,
                        expected = %from,
                        "Batch status changed concurrently, re-evaluating transition"
                    );
                }
            }
        }

        Err(StateMachineError::ContentionExhausted {
            batch_id,
            attempts: MAX_TRANSITION_ATTEMPTS,
        }
        .into())
    }
}
