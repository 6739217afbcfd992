//! Service configuration: TOML file, environment overrides, validation.

use serde::{Deserialize, Serialize};
use std::env;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SorteoConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./sorteo_data".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Sweep cadence in seconds. A tunable, not a correctness property.
    pub sweep_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("missing required field: {0}")]
    MissingRequired(String),
}

/// Loads configuration with the precedence file < environment.
pub struct ConfigLoader {
    path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { path: None }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<SorteoConfig, ConfigError> {
        let mut config = match &self.path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::LoadFailed(format!("{path}: {e}")))?;
                toml::from_str(&text)
                    .map_err(|e| ConfigError::LoadFailed(format!("{path}: {e}")))?
            }
            None => SorteoConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;
        Ok(config)
    }

    fn apply_env_overrides(&self, config: &mut SorteoConfig) -> Result<(), ConfigError> {
        if let Ok(data_dir) = env::var("SORTEO_DATA_DIR") {
            config.storage.data_dir = data_dir;
        }

        if let Ok(secs) = env::var("SORTEO_SWEEP_INTERVAL_SECS") {
            config.scheduler.sweep_interval_secs =
                secs.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "SORTEO_SWEEP_INTERVAL_SECS".to_string(),
                    value: secs,
                    reason: "not a valid number of seconds".to_string(),
                })?;
        }

        Ok(())
    }

    fn validate(&self, config: &SorteoConfig) -> Result<(), ConfigError> {
        if config.storage.data_dir.is_empty() {
            return Err(ConfigError::MissingRequired("storage.data_dir".to_string()));
        }

        if config.scheduler.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.sweep_interval_secs".to_string(),
                value: "0".to_string(),
                reason: "interval cannot be zero".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
