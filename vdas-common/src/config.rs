//! Bootstrap configuration loading and root folder resolution
//!
//! Configuration sources, highest priority first:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default
//!
//! A missing TOML file is not an error: the service starts on defaults and logs
//! a warning. A TOML file that exists but does not parse is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Name of the directory used under the platform config/data directories
pub const APP_DIR_NAME: &str = "vdas";

/// Bootstrap configuration loaded from TOML
///
/// Every field is optional; services resolve missing values against
/// environment variables and built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database and stored objects
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP listen port
    #[serde(default)]
    pub port: Option<u16>,

    /// Externally reachable base URL of this service (used to build object URLs)
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Browser origins allowed by the CORS policy
    #[serde(default)]
    pub allowed_origins: Option<Vec<String>>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// `[inference]` section
    #[serde(default)]
    pub inference: InferenceConfig,

    /// `[assessment]` section
    #[serde(default)]
    pub assessment: AssessmentConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Inference provider settings from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    /// Model ids of the independent damage detectors
    pub damage_models: Option<Vec<String>>,
    /// Model id of the damage severity detector
    pub severity_model: Option<String>,
    pub requests_per_second: Option<u32>,
}

/// Assessment engine tuning from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentConfig {
    pub staleness_window_secs: Option<u64>,
    pub timeout_window_secs: Option<u64>,
    pub retention_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub max_concurrent_runs: Option<usize>,
    pub fusion_overlap_threshold: Option<f64>,
    pub fusion_min_confidence: Option<f64>,
    pub comparison_overlap_threshold: Option<f64>,
    pub require_same_class: Option<bool>,
    pub annotate: Option<bool>,
    pub max_upload_bytes: Option<usize>,
}

/// Default TOML location for a module: `<config dir>/vdas/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(format!("{}.toml", module_name)))
}

/// Load TOML bootstrap configuration
///
/// Returns defaults (with a warning) when the file does not exist.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed for {}: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed for {}: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Resolve the root folder
///
/// Priority: CLI argument → environment variable → TOML → compiled default.
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
///
/// `~/.local/share/vdas` on Linux, `~/Library/Application Support/vdas` on macOS,
/// `%LOCALAPPDATA%\vdas` on Windows.
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("./vdas_data"))
}

/// Create the root folder if it is missing and return the database path inside it
pub fn ensure_root_folder(root_folder: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(root_folder).map_err(|e| {
        Error::Config(format!(
            "Failed to create root folder {}: {}",
            root_folder.display(),
            e
        ))
    })?;
    Ok(root_folder.join("vdas.db"))
}
