use thiserror::Error;

use super::states::BatchState;
use crate::models::BatchId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateMachineError {
    #[error("Invalid transition for batch {batch_id}: '{event}' from state '{from}'")]
    InvalidTransition {
        batch_id: BatchId,
        from: BatchState,
        event: String,
    },

    #[error("Batch {0} not found")]
    BatchNotFound(BatchId),

    #[error("Batch {batch_id} status changed concurrently on every one of {attempts} attempts")]
    ContentionExhausted { batch_id: BatchId, attempts: u32 },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
