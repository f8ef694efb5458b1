//! Batch processing handlers: start, status, stop, consolidate, cleanup.

use super::{CleanupResponse, MessageResponse};
use crate::api::AppState;
use crate::types::{ConsolidationReport, StartResponse, StatusSnapshot};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /process/start - Start converting every supported file in the input directory
#[utoipa::path(
    post,
    path = "/process/start",
    tag = "processing",
    responses(
        (status = 200, description = "Batch accepted", body = StartResponse),
        (status = 400, description = "No supported files in the input directory", body = crate::error::ApiError),
        (status = 409, description = "A batch is already running", body = crate::error::ApiError)
    )
)]
pub async fn start_processing(State(state): State<AppState>) -> Response {
    match state.orchestrator.start_batch().await {
        Ok(started) => (StatusCode::OK, Json(started)).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Rejected batch start");
            e.into_response()
        }
    }
}

/// GET /process/status - Current batch status
#[utoipa::path(
    get,
    path = "/process/status",
    tag = "processing",
    responses(
        (status = 200, description = "Consistent status snapshot", body = StatusSnapshot)
    )
)]
pub async fn processing_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.orchestrator.status().await))
}

/// POST /process/stop - Stop the running batch before its next file
#[utoipa::path(
    post,
    path = "/process/stop",
    tag = "processing",
    responses(
        (status = 202, description = "Stop requested", body = MessageResponse),
        (status = 409, description = "No batch is running", body = crate::error::ApiError)
    )
)]
pub async fn stop_processing(State(state): State<AppState>) -> Response {
    match state.orchestrator.stop_batch().await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(MessageResponse {
                message: "stop requested".to_string(),
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /process/consolidate - Merge all artifacts into one document
#[utoipa::path(
    post,
    path = "/process/consolidate",
    tag = "processing",
    responses(
        (status = 200, description = "Consolidated document written", body = ConsolidationReport),
        (status = 404, description = "No artifacts to consolidate", body = crate::error::ApiError),
        (status = 409, description = "A batch is running", body = crate::error::ApiError),
        (status = 500, description = "The document could not be written", body = crate::error::ApiError)
    )
)]
pub async fn consolidate_files(State(state): State<AppState>) -> Response {
    match state.orchestrator.consolidate().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Consolidation failed");
            e.into_response()
        }
    }
}

/// POST /process/cleanup - Remove zero-byte artifacts
#[utoipa::path(
    post,
    path = "/process/cleanup",
    tag = "processing",
    responses(
        (status = 200, description = "Empty artifacts removed", body = CleanupResponse),
        (status = 409, description = "A batch is running", body = crate::error::ApiError)
    )
)]
pub async fn cleanup_output(State(state): State<AppState>) -> Response {
    match state.orchestrator.clean_output().await {
        Ok(removed) => (StatusCode::OK, Json(CleanupResponse { removed })).into_response(),
        Err(e) => e.into_response(),
    }
}
