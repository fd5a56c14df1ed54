//! # Row Result Callback Handler
//!
//! Endpoint the generation worker calls once per completed row.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::ledger::RowUpdateOutcome;
use crate::orchestration::RowResultCallback;
use crate::state_machine::RowState;
use crate::web::errors::ApiResult;
use crate::web::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowResultResponse {
    /// False when the row was already terminal and nothing changed
    pub recorded: bool,
    /// Status the row holds after this call
    pub row_status: RowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_rows: Option<usize>,
}

/// Record a row result: POST /v1/callbacks/rows
pub async fn record_row_result(
    State(state): State<AppState>,
    body: Result<Json<RowResultCallback>, JsonRejection>,
) -> ApiResult<Json<RowResultResponse>> {
    let Json(callback) = body?;
    let status = callback.status;

    let response = match state.orchestrator().record_row_result(callback).await? {
        RowUpdateOutcome::Applied { remaining, .. } => RowResultResponse {
            recorded: true,
            row_status: status,
            remaining_rows: Some(remaining),
        },
        RowUpdateOutcome::Unchanged { current } => RowResultResponse {
            recorded: false,
            row_status: current,
            remaining_rows: None,
        },
    };

    Ok(Json(response))
}
