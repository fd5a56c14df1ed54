//! # Batch Handlers
//!
//! Batch creation, status polling, cancellation and resume.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{BatchId, NewBatch};
use crate::orchestration::BatchStatusResponse;
use crate::state_machine::BatchState;
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

/// Response for successful batch creation
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreationResponse {
    pub batch_id: BatchId,
    pub total_rows: usize,
    pub status: BatchState,
}

/// Response for cancel and resume
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchActionResponse {
    pub batch_id: BatchId,
    pub status: BatchState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redispatched_rows: Option<usize>,
}

pub(crate) fn parse_batch_id(raw: &str) -> ApiResult<BatchId> {
    raw.parse().map_err(|_| ApiError::invalid_uuid(raw))
}

/// Create a batch: POST /v1/batches
///
/// Returns as soon as the batch and its ledger entries are recorded; dispatch to
/// the generation worker continues in the background.
pub async fn create_batch(
    State(state): State<AppState>,
    body: Result<Json<NewBatch>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BatchCreationResponse>)> {
    let Json(request) = body?;
    debug!(rows = request.rows.len(), "Creating batch");

    let created = state.orchestrator().create_batch(request).await?;

    info!(
        batch_id = %created.batch_id,
        total_rows = created.total_rows,
        "✅ Batch accepted"
    );

    Ok((
        StatusCode::CREATED,
        Json(BatchCreationResponse {
            batch_id: created.batch_id,
            total_rows: created.total_rows,
            status: BatchState::Pending,
        }),
    ))
}

/// Poll a batch: GET /v1/batches/:batch_id
pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<BatchStatusResponse>> {
    let batch_id = parse_batch_id(&batch_id)?;
    let status = state.status_query().get_status(batch_id).await?;
    Ok(Json(status))
}

/// Cancel a batch: POST /v1/batches/:batch_id/cancel
pub async fn cancel_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<BatchActionResponse>> {
    let batch_id = parse_batch_id(&batch_id)?;
    let batch = state.orchestrator().cancel(batch_id).await?;

    Ok(Json(BatchActionResponse {
        batch_id,
        status: batch.status,
        redispatched_rows: None,
    }))
}

/// Resume a cancelled or failed batch: POST /v1/batches/:batch_id/resume
pub async fn resume_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<BatchActionResponse>> {
    let batch_id = parse_batch_id(&batch_id)?;
    let outcome = state.orchestrator().resume(batch_id).await?;

    Ok(Json(BatchActionResponse {
        batch_id,
        status: outcome.batch.status,
        redispatched_rows: Some(outcome.redispatched_rows),
    }))
}
