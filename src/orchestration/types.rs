use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::{JoinError, JoinHandle};

use crate::models::{Batch, BatchId, RowId, RowInput};
use crate::state_machine::{BatchState, RowState};

/// Who substitutes `{{field}}` placeholders before generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubstitutionMode {
    /// The worker receives the raw template and renders it per row
    #[default]
    Worker,
    /// The orchestrator renders every row and ships the results in the payload
    Orchestrator,
}

/// Per-row result reported by the generation worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowResultCallback {
    pub batch_id: BatchId,
    pub row_id: RowId,
    pub status: RowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RowResultCallback {
    pub fn success(batch_id: BatchId, row_id: RowId, output: impl Into<String>) -> Self {
        Self {
            batch_id,
            row_id,
            status: RowState::Success,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn error(batch_id: BatchId, row_id: RowId, error: impl Into<String>) -> Self {
        Self {
            batch_id,
            row_id,
            status: RowState::Error,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Handle to a detached dispatch task.
///
/// Dropping it leaves the task running.
#[derive(Debug)]
pub struct DispatchHandle(JoinHandle<()>);

impl DispatchHandle {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self(handle)
    }

    /// Wait for the dispatch task to write its outcome back to the batch
    pub async fn join(self) -> Result<(), JoinError> {
        self.0.await
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

/// Returned by `create_batch` before dispatch has happened
#[derive(Debug)]
pub struct BatchCreated {
    pub batch_id: BatchId,
    pub total_rows: usize,
    pub dispatch: DispatchHandle,
}

#[derive(Debug)]
pub struct ResumeOutcome {
    /// Batch record right after the resume (pending, or already finalized)
    pub batch: Batch,
    /// Number of rows handed to the worker again
    pub redispatched_rows: usize,
    /// `None` when nothing was left to dispatch
    pub dispatch: Option<DispatchHandle>,
}

/// One ledger entry as seen by polling clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowView {
    pub id: RowId,
    pub input: RowInput,
    pub output: String,
    pub status: RowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusResponse {
    pub batch_id: BatchId,
    pub status: BatchState,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub error_rows: usize,
    pub progress_percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
    pub rows: Vec<RowView>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
