//! vdas-ai library interface
//!
//! Vehicle damage assessment: fuses several hosted damage detectors per photo,
//! compares pickup and return photos per vehicle side and tracks each
//! assessment as a persisted job. Exposed as a library for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod fusion;
pub mod geometry;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::DEFAULT_ALLOWED_ORIGINS;
use crate::services::{AssessmentOrchestrator, ObjectStorage};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: AssessmentOrchestrator,
    pub storage: Arc<dyn ObjectStorage>,
    /// Directory served at `/objects`
    pub objects_dir: PathBuf,
    /// Request body limit for uploads
    pub max_upload_bytes: usize,
    /// Browser origins allowed to call the API
    pub allowed_origins: Vec<String>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        orchestrator: AssessmentOrchestrator,
        storage: Arc<dyn ObjectStorage>,
        objects_dir: PathBuf,
    ) -> Self {
        let max_upload_bytes = orchestrator.settings().max_upload_bytes;
        Self {
            orchestrator,
            storage,
            objects_dir,
            max_upload_bytes,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect(),
            startup_time: Utc::now(),
        }
    }

    pub fn with_allowed_origins(mut self, allowed_origins: Vec<String>) -> Self {
        self.allowed_origins = allowed_origins;
        self
    }
}

/// CORS policy for the configured browser origins
///
/// Origins that are not valid header values are skipped with a warning.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let objects = ServeDir::new(&state.objects_dir);
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);
    let cors = cors_layer(&state.allowed_origins);

    Router::new()
        .merge(api::health_routes())
        .merge(api::assessment_routes())
        .merge(api::upload_routes())
        .nest_service("/objects", objects)
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
