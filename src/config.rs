use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::log_buffer::DEFAULT_CAPACITY;
use crate::synchronizer::SyncConfig;

pub const CONFIG_FILE_NAME: &str = "eval-pulse.toml";
pub const API_URL_ENV: &str = "EVAL_PULSE_API_URL";
pub const TOKEN_ENV: &str = "EVAL_PULSE_TOKEN";

#[derive(Default, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EvalPulseConfig {
    pub api: ApiConfig,
    pub polling: PollingConfig,
    pub simulator: SimulatorConfig,
    pub console: ConsoleConfig,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub fetch_timeout_ms: u64,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SimulatorConfig {
    pub tick_ms: u64,
    /// Largest percent step a single tick may add.
    pub max_step: f64,
    /// Chance that a tick also emits a console line.
    pub log_probability: f64,
    /// Fixed seed for reproducible runs; OS entropy when absent.
    pub seed: Option<u64>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    pub capacity: usize,
    pub banner_dismiss_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_ms: 15_000,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            fetch_timeout_ms: 10_000,
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            max_step: 1.5,
            log_probability: 0.3,
            seed: None,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            banner_dismiss_ms: 4_000,
        }
    }
}

impl EvalPulseConfig {
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            interval: Duration::from_millis(self.polling.interval_ms),
            fetch_timeout: Duration::from_millis(self.polling.fetch_timeout_ms),
            log_capacity: self.console.capacity,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.api.request_timeout_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.simulator.tick_ms)
    }

    pub fn banner_dismiss(&self) -> Duration {
        Duration::from_millis(self.console.banner_dismiss_ms)
    }
}

pub fn validate(config: &EvalPulseConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    let url = config.api.base_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(format!(
            "api.base_url must start with http:// or https:// (got '{}')",
            config.api.base_url
        ));
    }
    if config.api.request_timeout_ms == 0 {
        errors.push("api.request_timeout_ms must be > 0".to_string());
    }

    if config.polling.interval_ms == 0 {
        errors.push("polling.interval_ms must be > 0".to_string());
    }
    if config.polling.fetch_timeout_ms == 0 {
        errors.push("polling.fetch_timeout_ms must be > 0".to_string());
    }

    if config.simulator.tick_ms == 0 {
        errors.push("simulator.tick_ms must be > 0".to_string());
    }
    if !(config.simulator.max_step.is_finite() && config.simulator.max_step > 0.0) {
        errors.push("simulator.max_step must be a positive number".to_string());
    }
    if !(0.0..=1.0).contains(&config.simulator.log_probability) {
        errors.push("simulator.log_probability must be between 0 and 1".to_string());
    }

    if config.console.capacity < 1 {
        errors.push("console.capacity must be >= 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Load `eval-pulse.toml` from `project_root`; defaults when the file is absent.
pub fn load_config(project_root: &Path) -> Result<EvalPulseConfig, String> {
    load_config_at(&default_config_path(project_root), false)
}

/// Load from an explicit `--config` path, falling back to `project_root`.
///
/// An explicit path must exist.
pub fn load_config_from(
    config_path: Option<&Path>,
    project_root: &Path,
) -> Result<EvalPulseConfig, String> {
    match config_path {
        Some(path) => load_config_at(path, true),
        None => load_config(project_root),
    }
}

fn load_config_at(config_path: &Path, required: bool) -> Result<EvalPulseConfig, String> {
    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| format!("Failed to read {}: {}", config_path.display(), e))?;
        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse {}: {}", config_path.display(), e))?
    } else if required {
        return Err(format!("Config file not found: {}", config_path.display()));
    } else {
        EvalPulseConfig::default()
    };

    apply_env_overrides(&mut config, std::env::var(API_URL_ENV).ok());

    validate(&config).map_err(|errors| {
        format!(
            "Config validation failed:\n{}",
            errors
                .iter()
                .map(|e| format!("  - {}", e))
                .collect::<Vec<_>>()
                .join("\n")
        )
    })?;

    Ok(config)
}

/// A non-blank API URL from the environment wins over the file.
pub fn apply_env_overrides(config: &mut EvalPulseConfig, api_url: Option<String>) {
    if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
        config.api.base_url = url.trim().to_string();
    }
}

/// Default location of the config file for `project_root`.
pub fn default_config_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_FILE_NAME)
}
