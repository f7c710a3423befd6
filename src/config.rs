//! Runner configuration
//!
//! Loaded from YAML, then adjusted by `TRELLIS_*` environment variables.
//! Engine settings are handed to every test context; the app section only
//! shapes the simulator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use app_sim::SimConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use trellis_command_queue::EngineConfig;
use url::Url;

pub const ENV_BASE_URL: &str = "TRELLIS_BASE_URL";
pub const ENV_COMMAND_TIMEOUT_MS: &str = "TRELLIS_COMMAND_TIMEOUT_MS";
pub const ENV_POLL_INTERVAL_MS: &str = "TRELLIS_POLL_INTERVAL_MS";
pub const ENV_WAIT_TIMEOUT_MS: &str = "TRELLIS_WAIT_TIMEOUT_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{key} must be a number of milliseconds, got `{value}`")]
    InvalidOverride { key: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("no configuration directory available on this platform")]
    NoConfigDir,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub base_url: String,
    pub command_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub wait_timeout_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            command_timeout_ms: 4000,
            poll_interval_ms: 50,
            wait_timeout_ms: 5000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub api_latency_ms: u64,
    pub render_delay_ms: u64,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            api_latency_ms: 25,
            render_delay_ms: 10,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub engine: EngineSection,
    pub app: AppSection,
}

impl RunnerConfig {
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            base_url: self.engine.base_url.clone(),
            command_timeout: Duration::from_millis(self.engine.command_timeout_ms),
            poll_interval: Duration::from_millis(self.engine.poll_interval_ms),
            wait_timeout: Duration::from_millis(self.engine.wait_timeout_ms),
        }
    }

    /// The simulated page fetches from the same origin the tests visit.
    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            base_url: self.engine.base_url.clone(),
            api_latency_ms: self.app.api_latency_ms,
            render_delay_ms: self.app.render_delay_ms,
        }
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup; unset keys leave values alone.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            info!("Using base URL from {}: {}", ENV_BASE_URL, base_url);
            self.engine.base_url = base_url;
        }
        let millis = |key: &'static str| -> Result<Option<u64>, ConfigError> {
            match lookup(key) {
                Some(value) => value
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| ConfigError::InvalidOverride { key, value }),
                None => Ok(None),
            }
        };
        if let Some(ms) = millis(ENV_COMMAND_TIMEOUT_MS)? {
            self.engine.command_timeout_ms = ms;
        }
        if let Some(ms) = millis(ENV_POLL_INTERVAL_MS)? {
            self.engine.poll_interval_ms = ms;
        }
        if let Some(ms) = millis(ENV_WAIT_TIMEOUT_MS)? {
            self.engine.wait_timeout_ms = ms;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.engine.base_url).map_err(|err| {
            ConfigError::Invalid(format!("engine.base_url `{}`: {err}", self.engine.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "engine.base_url must be http or https, got `{}`",
                url.scheme()
            )));
        }
        if self.engine.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.engine.poll_interval_ms > self.engine.command_timeout_ms {
            return Err(ConfigError::Invalid(format!(
                "engine.poll_interval_ms ({}) exceeds engine.command_timeout_ms ({})",
                self.engine.poll_interval_ms, self.engine.command_timeout_ms
            )));
        }
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    path.push("trellis");
    path.push("config.yaml");
    Ok(path)
}

/// Read the config file, or fall back to defaults when it does not exist.
/// Returns the configuration together with the path that was consulted.
pub async fn load_config(config_path: Option<&Path>) -> Result<(RunnerConfig, PathBuf), ConfigError> {
    let config_path = match config_path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    let config = if config_path.exists() {
        let content = tokio::fs::read_to_string(&config_path)
            .await
            .map_err(|source| ConfigError::Read {
                path: config_path.clone(),
                source,
            })?;
        let config = RunnerConfig::from_yaml(&content, &config_path)?;
        info!("Loaded configuration from: {}", config_path.display());
        config
    } else {
        warn!(
            "Config file not found, using defaults: {}",
            config_path.display()
        );
        RunnerConfig::default()
    };
    debug!(?config, "configuration loaded");
    Ok((config, config_path))
}
