//! # Batch Model
//!
//! One user-submitted job: a list of rows processed independently against a
//! single instruction template.
//!
//! ## Database Schema
//!
//! Maps to the `bulkgen_batches` table:
//! - `batch_id`: Primary key (UUID)
//! - `status`: Current lifecycle state (VARCHAR)
//! - `total_rows`: Row count fixed at creation (INTEGER)
//! - `remaining_rows` / `error_rows`: Completion counters maintained by the row ledger
//! - `instruction_template`: Instruction with `{{field}}` placeholders (TEXT)
//! - `message`: Human-readable failure reason, if any (TEXT)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::state_machine::BatchState;

/// Field name to value mapping for one input row
pub type RowInput = serde_json::Map<String, Value>;

/// Unique identifier for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BatchId {
    fn from(uuid: Uuid) -> Self {
        BatchId(uuid)
    }
}

impl std::ops::Deref for BatchId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BatchId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(BatchId)
    }
}

/// Input parameters for creating a new batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBatch {
    /// Instruction containing `{{field}}` placeholders
    pub instruction_template: String,
    /// One JSON object per input row
    pub rows: Vec<Value>,
    /// Free-text context forwarded to the worker with every row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auxiliary_context: Option<String>,
    /// Output columns the worker is asked to produce
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_output_fields: Option<Vec<String>>,
}

impl NewBatch {
    pub fn new(instruction_template: impl Into<String>, rows: Vec<Value>) -> Self {
        Self {
            instruction_template: instruction_template.into(),
            rows,
            auxiliary_context: None,
            requested_output_fields: None,
        }
    }

    pub fn with_auxiliary_context(mut self, context: impl Into<String>) -> Self {
        self.auxiliary_context = Some(context.into());
        self
    }

    pub fn with_requested_output_fields(mut self, fields: Vec<String>) -> Self {
        self.requested_output_fields = Some(fields);
        self
    }
}

/// A batch record as held by the batch store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub status: BatchState,
    /// Number of rows at creation; never changes afterwards
    pub total_rows: usize,
    pub instruction_template: String,
    pub auxiliary_context: Option<String>,
    pub requested_output_fields: Option<Vec<String>>,
    /// Reason recorded by the dispatch path when the batch failed
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Bumped on every status transition
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    /// Build the pending record for a freshly submitted batch
    pub fn new_pending(
        id: BatchId,
        input: &NewBatch,
        total_rows: usize,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: BatchState::Pending,
            total_rows,
            instruction_template: input.instruction_template.clone(),
            auxiliary_context: input.auxiliary_context.clone(),
            requested_output_fields: input.requested_output_fields.clone(),
            message: None,
            created_at: now,
            updated_at: now,
        }
    }
}
