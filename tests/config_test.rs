mod common;

use std::time::Duration;

use eval_pulse::config::{
    apply_env_overrides, default_config_path, load_config, load_config_from, validate,
    EvalPulseConfig,
};

use common::write_config;

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = load_config(dir.path()).unwrap();
    let defaults = EvalPulseConfig::default();
    assert_eq!(config.polling, defaults.polling);
    assert_eq!(config.console, defaults.console);
    assert_eq!(config.simulator, defaults.simulator);
}

#[test]
fn defaults_match_the_live_views() {
    let config = EvalPulseConfig::default();
    assert_eq!(config.api.base_url, "http://localhost:8000");
    assert_eq!(config.polling.interval_ms, 5000);
    assert_eq!(config.simulator.tick_ms, 100);
    assert_eq!(config.console.capacity, 20);

    let sync = config.sync_config();
    assert_eq!(sync.interval, Duration::from_secs(5));
    assert_eq!(sync.fetch_timeout, Duration::from_secs(10));
    assert_eq!(sync.log_capacity, 20);
    assert!(validate(&config).is_ok());
}

#[test]
fn partial_file_keeps_other_defaults() {
    let (dir, _path) = write_config(
        r#"
[polling]
interval_ms = 2500

[simulator]
seed = 42
"#,
    );
    let config = load_config(dir.path()).unwrap();
    assert_eq!(config.polling.interval_ms, 2500);
    assert_eq!(config.polling.fetch_timeout_ms, 10_000);
    assert_eq!(config.simulator.seed, Some(42));
    assert_eq!(config.simulator.max_step, 1.5);
}

#[test]
fn default_path_is_where_config_is_written() {
    let (dir, path) = write_config("[console]\ncapacity = 3\n");
    assert_eq!(default_config_path(dir.path()), path);
    assert_eq!(load_config(dir.path()).unwrap().console.capacity, 3);
}

#[test]
fn explicit_path_must_exist() {
    let dir = tempfile::TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");
    let err = load_config_from(Some(&missing), dir.path()).unwrap_err();
    assert!(err.contains("not found"), "{}", err);
}

#[test]
fn explicit_path_is_read() {
    let (dir, path) = write_config("[console]\ncapacity = 7\n");
    let other = tempfile::TempDir::new().unwrap();
    let config = load_config_from(Some(&path), other.path()).unwrap();
    assert_eq!(config.console.capacity, 7);
    drop(dir);
}

#[test]
fn malformed_toml_is_reported_with_path() {
    let (dir, _path) = write_config("[polling\ninterval_ms = ");
    let err = load_config(dir.path()).unwrap_err();
    assert!(err.contains("Failed to parse"), "{}", err);
    assert!(err.contains("eval-pulse.toml"), "{}", err);
}

#[test]
fn validation_collects_every_problem() {
    let mut config = EvalPulseConfig::default();
    config.api.base_url = "ftp://backend".to_string();
    config.polling.interval_ms = 0;
    config.simulator.log_probability = 1.5;
    config.simulator.max_step = 0.0;
    config.console.capacity = 0;

    let errors = validate(&config).unwrap_err();
    assert_eq!(errors.len(), 5, "{:?}", errors);
    assert!(errors.iter().any(|e| e.starts_with("api.base_url")));
    assert!(errors.iter().any(|e| e.starts_with("polling.interval_ms")));
    assert!(errors.iter().any(|e| e.starts_with("console.capacity")));
}

#[test]
fn invalid_file_fails_to_load() {
    let (dir, _path) = write_config("[polling]\ninterval_ms = 0\n");
    let err = load_config(dir.path()).unwrap_err();
    assert!(err.contains("Config validation failed"), "{}", err);
    assert!(err.contains("polling.interval_ms"), "{}", err);
}

#[test]
fn env_url_overrides_file() {
    let mut config = EvalPulseConfig::default();
    apply_env_overrides(&mut config, Some(" https://api.example.org ".to_string()));
    assert_eq!(config.api.base_url, "https://api.example.org");

    apply_env_overrides(&mut config, Some("   ".to_string()));
    assert_eq!(config.api.base_url, "https://api.example.org");

    apply_env_overrides(&mut config, None);
    assert_eq!(config.api.base_url, "https://api.example.org");
}
