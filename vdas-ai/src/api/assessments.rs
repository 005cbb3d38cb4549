//! Assessment status API handlers
//!
//! GET /assessment/:id, POST /assessment/:id/run

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::{
    error::{ApiError, ApiResult},
    models::AssessmentJob,
    AppState,
};

/// GET /assessment/:id
///
/// Returns the current record. Reading may restart a stale pending job or
/// fail a job that exceeded the timeout.
pub async fn get_assessment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AssessmentJob>> {
    let job = state
        .orchestrator
        .evaluate_and_maybe_recover(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Assessment {} not found", id)))?;

    Ok(Json(job))
}

/// POST /assessment/:id/run
///
/// Starts a pending job in the background. Returns 202 with the record; a job
/// that was not pending is returned unchanged.
pub async fn run_assessment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<AssessmentJob>)> {
    let job = state
        .orchestrator
        .start_job(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Assessment {} not found", id)))?;

    tracing::debug!(job_id = %id, status = %job.status, "Run requested");
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// Build assessment routes
pub fn assessment_routes() -> Router<AppState> {
    Router::new()
        .route("/assessment/:id", get(get_assessment))
        .route("/assessment/:id/run", post(run_assessment))
}
