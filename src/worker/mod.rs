//! # Generation Worker Interface
//!
//! The orchestrator hands a batch to an external, asynchronous generation
//! worker and only waits for an acknowledgement of receipt. Rows are reported
//! back later, one by one, through the row-result callback.
//!
//! [`GenerationWorker`] abstracts the transport so the dispatch path can be
//! exercised against [`crate::test_utils::MockGenerationWorker`] in tests and
//! against [`http::HttpGenerationWorker`] in production.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{BatchId, RowId, RowInput};
use crate::orchestration::SubstitutionMode;

pub mod http;

pub use http::HttpGenerationWorker;

/// One row as sent to the worker: the ledger row id plus the original fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRow {
    pub id: RowId,
    #[serde(flatten)]
    pub fields: RowInput,
}

impl DispatchRow {
    /// An input field literally named `id` is dropped here; the ledger row id
    /// takes that key in the payload.
    pub fn new(id: RowId, input: &RowInput) -> Self {
        let mut fields = input.clone();
        fields.remove("id");
        Self { id, fields }
    }
}

/// Payload posted to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub batch_id: BatchId,
    pub rows: Vec<DispatchRow>,
    pub instruction_template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auxiliary_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_output_fields: Option<Vec<String>>,
    pub substitution: SubstitutionMode,
    /// Per-row rendered instruction, keyed by row id; orchestrator substitution only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_instructions: Option<BTreeMap<String, String>>,
}

/// Receipt acknowledgement from the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchAck {
    pub status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The request never produced a response (connection refused, reset, DNS)
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Worker did not respond within {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The worker answered with a non-success status
    #[error("Worker rejected dispatch with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Failed to encode dispatch payload: {0}")]
    Encoding(String),
}

impl DispatchError {
    /// Transport failures, timeouts, 408, 429 and 5xx are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Rejected { status, .. } => matches!(status, 408 | 429 | 500..=599),
            Self::Encoding(_) => false,
        }
    }
}

/// External generation worker
#[async_trait]
pub trait GenerationWorker: Send + Sync {
    /// Deliver the batch; returns once the worker acknowledged receipt.
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchAck, DispatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retryable_classification() {
        assert!(DispatchError::Transport("connection refused".into()).is_retryable());
        assert!(DispatchError::Timeout(Duration::from_secs(1)).is_retryable());
        for status in [408, 429, 500, 502, 503] {
            assert!(DispatchError::Rejected { status, body: String::new() }.is_retryable());
        }
        for status in [400, 401, 404, 422] {
            assert!(!DispatchError::Rejected { status, body: String::new() }.is_retryable());
        }
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let batch_id = BatchId::new();
        let input = json!({"name": "Alice", "id": 7}).as_object().cloned().unwrap();
        let request = DispatchRequest {
            batch_id,
            rows: vec![DispatchRow::new(RowId::new(batch_id, 0), &input)],
            instruction_template: "Bio for {{name}}".to_string(),
            auxiliary_context: None,
            requested_output_fields: Some(vec!["bio".to_string()]),
            substitution: SubstitutionMode::Worker,
            rendered_instructions: None,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["batchId"], json!(batch_id.to_string()));
        assert_eq!(value["instructionTemplate"], json!("Bio for {{name}}"));
        assert_eq!(value["requestedOutputFields"], json!(["bio"]));
        assert_eq!(value["substitution"], json!("worker"));
        assert_eq!(value["rows"][0]["id"], json!(format!("{batch_id}-row-0")));
        assert_eq!(value["rows"][0]["name"], json!("Alice"));
        assert!(value.get("auxiliaryContext").is_none());
        assert!(value.get("renderedInstructions").is_none());
    }
}
