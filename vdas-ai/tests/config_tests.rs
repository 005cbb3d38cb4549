//! Inference settings and CORS origin resolution tests
//!
//! Tests touching `VDAS_INFERENCE_API_KEY` are `#[serial]` since the process
//! environment is shared.

use serial_test::serial;
use std::env;

use vdas_ai::config::{
    resolve_allowed_origins, resolve_api_key, InferenceSettings, API_KEY_ENV_VAR,
    DEFAULT_ALLOWED_ORIGINS, DEFAULT_DAMAGE_MODELS, DEFAULT_INFERENCE_API_URL,
};
use vdas_common::config::{InferenceConfig, TomlConfig};

fn toml_with_key(key: Option<&str>) -> InferenceConfig {
    InferenceConfig {
        api_key: key.map(str::to_string),
        ..Default::default()
    }
}

#[test]
#[serial]
fn test_cli_key_wins() {
    env::set_var(API_KEY_ENV_VAR, "env-key");

    let key = resolve_api_key(Some("cli-key"), &toml_with_key(Some("toml-key"))).unwrap();
    assert_eq!(key, "cli-key");

    env::remove_var(API_KEY_ENV_VAR);
}

#[test]
#[serial]
fn test_env_key_beats_toml() {
    env::set_var(API_KEY_ENV_VAR, "env-key");

    let key = resolve_api_key(None, &toml_with_key(Some("toml-key"))).unwrap();
    assert_eq!(key, "env-key");

    env::remove_var(API_KEY_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_keys_fall_through() {
    env::set_var(API_KEY_ENV_VAR, "   ");

    let key = resolve_api_key(Some(""), &toml_with_key(Some("toml-key"))).unwrap();
    assert_eq!(key, "toml-key");

    env::remove_var(API_KEY_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_key_names_every_source() {
    env::remove_var(API_KEY_ENV_VAR);

    let err = resolve_api_key(None, &toml_with_key(None)).unwrap_err();
    let message = err.to_string();

    assert!(message.contains("--inference-api-key"));
    assert!(message.contains(API_KEY_ENV_VAR));
    assert!(message.contains("[inference]"));
}

#[test]
#[serial]
fn test_inference_settings_defaults() {
    env::remove_var(API_KEY_ENV_VAR);

    let settings = InferenceSettings::resolve(Some("k"), &TomlConfig::default()).unwrap();

    assert_eq!(settings.api_url, DEFAULT_INFERENCE_API_URL);
    assert_eq!(settings.api_key, "k");
    assert_eq!(settings.models.damage_models.len(), DEFAULT_DAMAGE_MODELS.len());
    assert!(settings.requests_per_second > 0);
}

#[test]
#[serial]
fn test_inference_settings_reject_empty_model_list() {
    let config = TomlConfig {
        inference: InferenceConfig {
            damage_models: Some(vec![]),
            ..Default::default()
        },
        ..Default::default()
    };

    assert!(InferenceSettings::resolve(Some("k"), &config).is_err());
}

fn origins(list: &[&str]) -> Vec<String> {
    list.iter().map(|o| o.to_string()).collect()
}

#[test]
fn test_allowed_origins_default() {
    let resolved = resolve_allowed_origins(&[], &TomlConfig::default());
    assert_eq!(resolved, origins(&DEFAULT_ALLOWED_ORIGINS));
}

#[test]
fn test_allowed_origins_cli_beats_toml() {
    let config = TomlConfig {
        allowed_origins: Some(origins(&["https://toml.example"])),
        ..Default::default()
    };

    assert_eq!(
        resolve_allowed_origins(&origins(&[" https://cli.example ", ""]), &config),
        origins(&["https://cli.example"])
    );
    assert_eq!(
        resolve_allowed_origins(&[], &config),
        origins(&["https://toml.example"])
    );
}

#[test]
fn test_allowed_origins_from_toml_file() {
    let config: TomlConfig =
        toml::from_str("allowed_origins = [\"https://a.example\", \"https://b.example\"]").unwrap();

    assert_eq!(
        resolve_allowed_origins(&[], &config),
        origins(&["https://a.example", "https://b.example"])
    );
}
