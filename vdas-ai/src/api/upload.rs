//! Image upload API handler
//!
//! POST /upload (multipart/form-data)

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::AssessmentUpdate,
    services::upload_intake::{group_side_uploads, store_side_uploads, UploadedImage},
    AppState,
};

/// POST /upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub upload_id: String,
}

/// POST /upload
///
/// Accepts `<side>-<phase>` image fields, stores them, creates a pending
/// assessment and starts it in the background. Non-file fields are ignored.
pub async fn upload_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut images = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let name = field.name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read field {}: {}", name, e)))?;

        images.push(UploadedImage {
            field: name,
            file_name: Some(file_name),
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    let sides = group_side_uploads(images)?;
    let upload_id = Uuid::new_v4().to_string();
    let side_count = sides.len();

    store_side_uploads(state.storage.as_ref(), &upload_id, sides).await?;
    state
        .orchestrator
        .store()
        .set(&upload_id, &AssessmentUpdate::pending(chrono::Utc::now()))
        .await?;

    tracing::info!(upload_id = %upload_id, sides = side_count, "Upload accepted");
    state.orchestrator.schedule(&upload_id);

    Ok(Json(UploadResponse { upload_id }))
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/upload", post(upload_images))
}
