//! Hosted object-detection inference client
//!
//! The detectors are hosted models addressed by model id (`<project>/<version>`).
//! One call runs one model against one publicly reachable image URL.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("vdas/", env!("CARGO_PKG_VERSION"));

/// Inference client errors
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Detection response of one model call
///
/// Predictions stay loosely typed; fusion coerces them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InferenceResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub predictions: Vec<Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Runs a detection model against an image
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn infer(&self, image_url: &str, model_id: &str)
        -> Result<InferenceResponse, InferenceError>;
}

type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// HTTP client for the hosted detection API
///
/// `POST {api_url}/{model_id}?api_key=..&image=..`, rate limited across all
/// models sharing this client.
pub struct HostedInferenceClient {
    http_client: reqwest::Client,
    api_url: String,
    api_key: String,
    rate_limiter: DirectRateLimiter,
}

impl HostedInferenceClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        requests_per_second: u32,
    ) -> Result<Self, InferenceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http_client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }
}

#[async_trait]
impl InferenceProvider for HostedInferenceClient {
    async fn infer(
        &self,
        image_url: &str,
        model_id: &str,
    ) -> Result<InferenceResponse, InferenceError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/{}", self.api_url, model_id.trim_matches('/'));
        tracing::debug!(model_id, image_url, "Requesting inference");

        let response = self
            .http_client
            .post(&url)
            .query(&[("api_key", self.api_key.as_str()), ("image", image_url)])
            .send()
            .await
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(model_id, status = status.as_u16(), "Inference API returned error");
            return Err(InferenceError::Api(status.as_u16(), body));
        }

        let parsed: InferenceResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Parse(e.to_string()))?;

        tracing::debug!(
            model_id,
            predictions = parsed.predictions.len(),
            "Inference complete"
        );

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_tolerates_missing_and_null_predictions() {
        let missing: InferenceResponse = serde_json::from_str(r#"{"time": 0.1}"#).unwrap();
        assert!(missing.predictions.is_empty());

        let null: InferenceResponse = serde_json::from_str(r#"{"predictions": null}"#).unwrap();
        assert!(null.predictions.is_empty());

        let some: InferenceResponse =
            serde_json::from_str(r#"{"predictions": [{"x": 1, "confidence": "0.7"}]}"#).unwrap();
        assert_eq!(some.predictions.len(), 1);
    }

    #[test]
    fn test_client_builds_with_zero_rate() {
        let client = HostedInferenceClient::new("https://detect.example.com/", "key", 0).unwrap();
        assert_eq!(client.api_url, "https://detect.example.com");
    }

    #[test]
    fn test_error_display() {
        let err = InferenceError::Api(403, "forbidden".to_string());
        assert_eq!(err.to_string(), "API error 403: forbidden");
    }
}
