//! Configuration Loader
//!
//! Environment-aware configuration loading: discovers a base YAML document
//! plus an optional per-environment overlay section and merges them, then
//! validates the result. The environment is detected from `SEQUENCER_ENV`
//! (falling back to `APP_ENV`, defaulting to `development`).
//!
//! Expected file shape:
//!
//! ```yaml
//! shutdown_grace_period_ms: 5000
//! event_channel_capacity: 1000
//!
//! test:
//!   shutdown_grace_period_ms: 500
//! ```

use std::env;
use std::path::{Path, PathBuf};

use serde_yaml::Value as YamlValue;
use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::SequencerConfig;

/// Environments that may appear as overlay sections in a config file.
const KNOWN_ENVIRONMENTS: &[&str] = &["development", "test", "production"];

/// Loads and owns a validated [`SequencerConfig`] for one environment.
pub struct ConfigManager {
    config: SequencerConfig,
    environment: String,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection.
    ///
    /// Looks for `config/sequencer.yaml` relative to the working directory;
    /// if no file exists, defaults are used.
    pub fn load() -> ConfigResult<Self> {
        let environment = Self::detect_environment();
        Self::load_from_path_with_env(Self::default_config_path().as_deref(), &environment)
    }

    /// Load configuration from an explicit file path with an explicit
    /// environment. Useful for tests that must not touch global env vars.
    pub fn load_from_path_with_env(
        path: Option<&Path>,
        environment: &str,
    ) -> ConfigResult<Self> {
        let config = match path {
            Some(path) => {
                debug!(
                    environment = %environment,
                    path = %path.display(),
                    "Loading sequencer configuration"
                );
                Self::load_and_merge(path, environment)?
            }
            None => {
                debug!(environment = %environment, "No configuration file; using defaults");
                SequencerConfig::default()
            }
        };

        config.validate()?;

        Ok(Self {
            config,
            environment: environment.to_string(),
        })
    }

    /// The validated configuration.
    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// The environment this configuration was loaded for.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Detect the current environment from environment variables.
    pub fn detect_environment() -> String {
        env::var("SEQUENCER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_path() -> Option<PathBuf> {
        let path = PathBuf::from("config/sequencer.yaml");
        path.exists().then_some(path)
    }

    /// Read the YAML document, strip environment overlay sections from the
    /// base, then apply the overlay matching `environment` on top.
    fn load_and_merge(path: &Path, environment: &str) -> ConfigResult<SequencerConfig> {
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ConfigurationError::file_not_found(path.display().to_string())
            }
            _ => ConfigurationError::file_read(path.display().to_string(), e.to_string()),
        })?;

        let document: YamlValue = serde_yaml::from_str(&raw)?;

        let YamlValue::Mapping(mut base) = document else {
            return Err(ConfigurationError::parse(
                "configuration root must be a YAML mapping",
            ));
        };

        let mut overlay = None;
        for env_name in KNOWN_ENVIRONMENTS {
            let key = YamlValue::String((*env_name).to_string());
            if let Some(section) = base.remove(&key) {
                if *env_name == environment {
                    overlay = Some(section);
                }
            }
        }

        if let Some(YamlValue::Mapping(overrides)) = overlay {
            for (key, value) in overrides {
                base.insert(key, value);
            }
        }

        Ok(serde_yaml::from_value(YamlValue::Mapping(base))?)
    }
}
