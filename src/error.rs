//! # Error Types
//!
//! Crate-wide error taxonomy for batch orchestration. Dispatch-path failures are
//! never returned to the original `create_batch` caller; they are recorded on the
//! batch and surfaced through the status query instead.

use thiserror::Error;

use crate::models::{BatchId, RowId};
use crate::state_machine::StateMachineError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BulkgenError {
    /// Bad input to `create_batch`; rejected before any state is written
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Batch {batch_id} already has row ledger entries")]
    DuplicateBatch { batch_id: BatchId },

    #[error("Row {row_id} not found in batch {batch_id}")]
    RowNotFound { batch_id: BatchId, row_id: RowId },

    #[error("Batch {0} not found")]
    BatchNotFound(BatchId),

    /// Network failure or worker rejection after retries were exhausted
    #[error("Dispatch failed for batch {batch_id}: {reason}")]
    DispatchFailed { batch_id: BatchId, reason: String },

    /// The breaker guarding a dependency is open; no call was attempted
    #[error("Circuit breaker open for {component}")]
    CircuitOpen { component: String },

    #[error("Invalid state transition for batch {batch_id}: {reason}")]
    InvalidStateTransition { batch_id: BatchId, reason: String },

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl BulkgenError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::StoreError(message.into())
    }

    /// Errors that describe a caller mistake rather than a system fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_)
                | Self::DuplicateBatch { .. }
                | Self::RowNotFound { .. }
                | Self::BatchNotFound(_)
                | Self::InvalidStateTransition { .. }
        )
    }
}

impl From<sqlx::Error> for BulkgenError {
    fn from(err: sqlx::Error) -> Self {
        BulkgenError::StoreError(err.to_string())
    }
}

impl From<serde_json::Error> for BulkgenError {
    fn from(error: serde_json::Error) -> Self {
        BulkgenError::ValidationError(format!("JSON serialization error: {error}"))
    }
}

impl From<crate::config::ConfigurationError> for BulkgenError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        BulkgenError::ConfigurationError(error.to_string())
    }
}

impl From<StateMachineError> for BulkgenError {
    fn from(error: StateMachineError) -> Self {
        match error {
            StateMachineError::InvalidTransition {
                batch_id,
                from,
                event,
            } => BulkgenError::InvalidStateTransition {
                batch_id,
                reason: format!("cannot apply '{event}' to a batch in state '{from}'"),
            },
            StateMachineError::BatchNotFound(batch_id) => BulkgenError::BatchNotFound(batch_id),
            StateMachineError::ContentionExhausted { batch_id, attempts } => {
                BulkgenError::StoreError(format!(
                    "status of batch {batch_id} kept changing underneath {attempts} transition attempts"
                ))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, BulkgenError>;
