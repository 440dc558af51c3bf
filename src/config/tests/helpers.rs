//! Shared fixtures and helper functions for config tests.

use std::sync::Arc;

use mockable::MockEnv;
use ortho_config::MergeComposer;
use ortho_config::serde_json::{self, json};
use rstest::fixture;

use crate::config::{DEFAULT_SERVICE_PORT, HarnessConfig};

/// Fixture providing a `HarnessConfig` parsed from a full TOML example.
#[fixture]
pub fn harness_config_from_full_toml() -> HarnessConfig {
    let toml = r#"
        engine_socket = "tcp://192.0.2.10:2376"

        [tls]
        verify = true
        cert_path = "/etc/testpod/certs"

        [readiness]
        timeout_ms = 10000
        poll_interval_ms = 25

        [pool]
        max_idle = 8
        max_active = 16
        idle_timeout_secs = 30
        connect_timeout_ms = 750
        wait_timeout_ms = 1500

        [service]
        image = "redis:7-alpine"
        port = "6380/tcp"
        address = "127.0.0.1:6380"
    "#;

    ortho_config::toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Build a `MockEnv` that answers `string` lookups from `vars`.
pub fn env_with(vars: &[(&str, &str)]) -> MockEnv {
    let owned_vars: Vec<(String, String)> = vars
        .iter()
        .map(|(key, value)| (String::from(*key), String::from(*value)))
        .collect();
    let mut env = MockEnv::new();
    env.expect_string().returning(move |key| {
        owned_vars
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.clone())
    });
    env
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = serde_json::to_value(HarnessConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Merges layers from a composer into `HarnessConfig`.
pub fn merge_config(
    composer: MergeComposer,
) -> Result<HarnessConfig, Arc<ortho_config::OrthoError>> {
    HarnessConfig::merge_from_layers(composer.layers())
}

/// Helper: Asserts that a config has all default values.
pub fn assert_config_has_defaults(config: &HarnessConfig) {
    assert!(
        config.engine_socket.is_none(),
        "engine_socket should be None"
    );
    assert!(!config.tls.verify, "tls.verify should be false");
    assert_eq!(config.readiness.timeout_ms, 30_000);
    assert_eq!(config.readiness.poll_interval_ms, 50);
    assert_eq!(config.pool.max_idle, 3);
    assert_eq!(config.pool.idle_timeout_secs, 60);
    assert!(config.service.image.is_none(), "service.image should be None");
    assert_eq!(config.service.port, DEFAULT_SERVICE_PORT);
}

/// Helper: Creates a `MergeComposer` with defaults, file, and env layers.
pub fn create_composer_with_file_and_env() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = create_composer_with_defaults()?;

    composer.push_file(
        json!({
            "engine_socket": "unix:///from/file.sock",
            "pool": { "max_idle": 4, "wait_timeout_ms": 900 },
            "service": { "image": "file-image:latest" }
        }),
        None,
    );

    composer.push_environment(json!({
        "engine_socket": "unix:///from/env.sock",
        "pool": { "max_idle": 6 }
    }));

    Ok(composer)
}
