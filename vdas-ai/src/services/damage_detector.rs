//! Per-image damage detection pipeline
//!
//! Runs every configured damage model and the severity model against one image
//! concurrently, then fuses the responses on the blocking pool. Any failed
//! model call fails the whole image.

use futures::future::{try_join, try_join_all};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::inference_client::{InferenceError, InferenceProvider};
use crate::fusion::{self, DetectorOutput, FusionParams};
use crate::models::FusedDetectionSet;

/// Damage detection errors
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("model {model_id} failed: {source}")]
    Inference {
        model_id: String,
        #[source]
        source: InferenceError,
    },

    #[error("fusion task failed: {0}")]
    Fusion(String),
}

/// Model ids queried for every image
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionModels {
    /// Independent damage detectors, fused in this order
    pub damage_models: Vec<String>,
    pub severity_model: String,
}

pub struct DamageDetector {
    provider: Arc<dyn InferenceProvider>,
    models: DetectionModels,
    fusion: FusionParams,
}

impl DamageDetector {
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        models: DetectionModels,
        fusion: FusionParams,
    ) -> Self {
        Self {
            provider,
            models,
            fusion,
        }
    }

    pub fn models(&self) -> &DetectionModels {
        &self.models
    }

    /// Detect confirmed damages on the image at `image_url`
    pub async fn detect(&self, image_url: &str) -> Result<FusedDetectionSet, DetectionError> {
        let damage_calls = self
            .models
            .damage_models
            .iter()
            .map(|model_id| self.run_model(image_url, model_id));

        let (detector_outputs, severity_output) = try_join(
            try_join_all(damage_calls),
            self.run_model(image_url, &self.models.severity_model),
        )
        .await?;

        let params = self.fusion;
        let fused = tokio::task::spawn_blocking(move || {
            fusion::fuse(&detector_outputs, &severity_output, &params)
        })
        .await
        .map_err(|e| DetectionError::Fusion(e.to_string()))?;

        debug!(image_url, detections = fused.len(), "Image fused");
        Ok(fused)
    }

    async fn run_model(
        &self,
        image_url: &str,
        model_id: &str,
    ) -> Result<DetectorOutput, DetectionError> {
        let response = self
            .provider
            .infer(image_url, model_id)
            .await
            .map_err(|source| DetectionError::Inference {
                model_id: model_id.to_string(),
                source,
            })?;

        Ok(DetectorOutput::new(model_id, response.predictions))
    }
}
