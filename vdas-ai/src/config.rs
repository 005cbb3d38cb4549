//! Configuration resolution for vdas-ai
//!
//! Runtime settings are resolved from the TOML bootstrap config over built-in
//! defaults and validated once at startup. The inference API key additionally
//! honours the command line and the environment (CLI → ENV → TOML).

use chrono::Duration;
use tracing::{info, warn};
use vdas_common::config::{AssessmentConfig, InferenceConfig, TomlConfig};
use vdas_common::{Error, Result};

use crate::fusion::FusionParams;
use crate::services::damage_comparator::ComparisonParams;
use crate::services::damage_detector::DetectionModels;

/// Environment variable holding the inference API key
pub const API_KEY_ENV_VAR: &str = "VDAS_INFERENCE_API_KEY";

pub const DEFAULT_INFERENCE_API_URL: &str = "https://detect.roboflow.com";
pub const DEFAULT_DAMAGE_MODELS: [&str; 2] = ["car-damage-detection-5ioys/1", "car-damage-c1f0i/1"];
pub const DEFAULT_SEVERITY_MODEL: &str = "car-damage-severity-detection-cardd/1";
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
/// Browser origins allowed when none are configured
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://localhost:8000"];

/// Assessment engine settings
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentSettings {
    /// Age after which a still-pending job is restarted on read
    pub staleness_window: Duration,
    /// Age after which an in-progress job is failed on read
    pub timeout_window: Duration,
    /// Lifetime of records and stored images
    pub retention: Duration,
    pub sweep_interval: Duration,
    /// Upper bound on concurrently executing runs
    pub max_concurrent_runs: usize,
    pub fusion: FusionParams,
    pub comparison: ComparisonParams,
    /// Render annotated return images
    pub annotate: bool,
    pub max_upload_bytes: usize,
}

impl Default for AssessmentSettings {
    fn default() -> Self {
        Self {
            staleness_window: Duration::minutes(10),
            timeout_window: Duration::minutes(30),
            retention: Duration::days(3),
            sweep_interval: Duration::minutes(15),
            max_concurrent_runs: 4,
            fusion: FusionParams::default(),
            comparison: ComparisonParams::default(),
            annotate: true,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl AssessmentSettings {
    /// Apply the `[assessment]` TOML section over the defaults and validate
    pub fn from_toml(config: &AssessmentConfig) -> Result<Self> {
        let defaults = Self::default();
        let secs = |value: Option<u64>, default: Duration| -> Result<Duration> {
            match value {
                Some(s) => i64::try_from(s)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .ok_or_else(|| Error::Config(format!("Duration of {} seconds out of range", s))),
                None => Ok(default),
            }
        };

        let settings = Self {
            staleness_window: secs(config.staleness_window_secs, defaults.staleness_window)?,
            timeout_window: secs(config.timeout_window_secs, defaults.timeout_window)?,
            retention: secs(config.retention_secs, defaults.retention)?,
            sweep_interval: secs(config.sweep_interval_secs, defaults.sweep_interval)?,
            max_concurrent_runs: config
                .max_concurrent_runs
                .unwrap_or(defaults.max_concurrent_runs),
            fusion: FusionParams {
                overlap_threshold: config
                    .fusion_overlap_threshold
                    .unwrap_or(defaults.fusion.overlap_threshold),
                min_confidence: config
                    .fusion_min_confidence
                    .unwrap_or(defaults.fusion.min_confidence),
            },
            comparison: ComparisonParams {
                overlap_threshold: config
                    .comparison_overlap_threshold
                    .unwrap_or(defaults.comparison.overlap_threshold),
                require_same_class: config
                    .require_same_class
                    .unwrap_or(defaults.comparison.require_same_class),
            },
            annotate: config.annotate.unwrap_or(defaults.annotate),
            max_upload_bytes: config.max_upload_bytes.unwrap_or(defaults.max_upload_bytes),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let in_unit = |name: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(Error::Config(format!("{} must be within 0.0..=1.0, got {}", name, value)))
            }
        };
        in_unit("fusion_overlap_threshold", self.fusion.overlap_threshold)?;
        in_unit("fusion_min_confidence", self.fusion.min_confidence)?;
        in_unit("comparison_overlap_threshold", self.comparison.overlap_threshold)?;

        for (name, window) in [
            ("staleness_window_secs", self.staleness_window),
            ("timeout_window_secs", self.timeout_window),
            ("retention_secs", self.retention),
            ("sweep_interval_secs", self.sweep_interval),
        ] {
            if window <= Duration::zero() {
                return Err(Error::Config(format!("{} must be positive", name)));
            }
        }

        if self.max_concurrent_runs == 0 {
            return Err(Error::Config("max_concurrent_runs must be at least 1".to_string()));
        }
        if self.timeout_window <= self.staleness_window {
            warn!(
                "Timeout window ({}s) is not longer than staleness window ({}s)",
                self.timeout_window.num_seconds(),
                self.staleness_window.num_seconds()
            );
        }

        Ok(())
    }
}

/// Inference provider settings
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceSettings {
    pub api_url: String,
    pub api_key: String,
    pub models: DetectionModels,
    pub requests_per_second: u32,
}

impl InferenceSettings {
    /// Resolve from the `[inference]` TOML section, with the API key looked up
    /// across all tiers
    pub fn resolve(cli_api_key: Option<&str>, toml_config: &TomlConfig) -> Result<Self> {
        let inference: &InferenceConfig = &toml_config.inference;
        let api_key = resolve_api_key(cli_api_key, inference)?;

        let damage_models = inference
            .damage_models
            .clone()
            .unwrap_or_else(|| DEFAULT_DAMAGE_MODELS.iter().map(|m| m.to_string()).collect());
        if damage_models.is_empty() || damage_models.iter().any(|m| m.trim().is_empty()) {
            return Err(Error::Config(
                "inference.damage_models must list at least one non-empty model id".to_string(),
            ));
        }

        let severity_model = inference
            .severity_model
            .clone()
            .unwrap_or_else(|| DEFAULT_SEVERITY_MODEL.to_string());
        if severity_model.trim().is_empty() {
            return Err(Error::Config("inference.severity_model must not be empty".to_string()));
        }

        Ok(Self {
            api_url: inference
                .api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_INFERENCE_API_URL.to_string()),
            api_key,
            models: DetectionModels {
                damage_models,
                severity_model,
            },
            requests_per_second: inference
                .requests_per_second
                .unwrap_or(DEFAULT_REQUESTS_PER_SECOND),
        })
    }
}

/// Resolve the inference API key
///
/// **Priority:** CLI → ENV → TOML
pub fn resolve_api_key(cli_api_key: Option<&str>, inference: &InferenceConfig) -> Result<String> {
    if let Some(key) = cli_api_key.filter(|k| is_valid_key(k)) {
        info!("Inference API key loaded from command line");
        return Ok(key.to_string());
    }

    if let Ok(key) = std::env::var(API_KEY_ENV_VAR) {
        if is_valid_key(&key) {
            info!("Inference API key loaded from environment variable");
            return Ok(key);
        }
    }

    if let Some(key) = inference.api_key.as_deref().filter(|k| is_valid_key(k)) {
        info!("Inference API key loaded from TOML config");
        return Ok(key.to_string());
    }

    Err(Error::Config(format!(
        "Inference API key not configured. Please configure using one of:\n\
         1. Command line: --inference-api-key <key>\n\
         2. Environment: {}=your-key-here\n\
         3. TOML config: [inference] api_key = \"your-key\"",
        API_KEY_ENV_VAR
    )))
}

/// Resolve the CORS allowed origins
///
/// **Priority:** CLI/ENV (`--allowed-origins`, `VDAS_ALLOWED_ORIGINS`) → TOML →
/// built-in defaults. Blank entries are dropped.
pub fn resolve_allowed_origins(cli_origins: &[String], config: &TomlConfig) -> Vec<String> {
    let clean = |origins: &[String]| -> Vec<String> {
        origins
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect()
    };

    let from_cli = clean(cli_origins);
    if !from_cli.is_empty() {
        return from_cli;
    }

    if let Some(origins) = config.allowed_origins.as_deref() {
        let from_toml = clean(origins);
        if !from_toml.is_empty() {
            return from_toml;
        }
        warn!("allowed_origins in TOML config is empty, using defaults");
    }

    DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect()
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
