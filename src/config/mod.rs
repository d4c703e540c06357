//! # Sequencer Configuration System
//!
//! Configuration management for the directive sequencing core. Values come
//! from YAML files with environment-specific overlays; nothing is read from
//! scattered environment variables at runtime, and every loaded configuration
//! is validated before use.
//!
//! ## Usage
//!
//! ```rust
//! use directive_sequencer::config::SequencerConfig;
//!
//! let config = SequencerConfig::default();
//! assert!(config.validate().is_ok());
//! assert_eq!(config.shutdown_grace_period().as_millis(), 5000);
//! ```

pub mod error;
pub mod loader;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Configuration for the directive sequencing core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SequencerConfig {
    /// How long `shutdown()` waits for in-flight handler callbacks to settle
    /// before force-marking the survivors cancelled.
    pub shutdown_grace_period_ms: u64,

    /// How long shutdown waits for a turn worker to finish cancelling after
    /// the grace period has elapsed, before the worker task is aborted.
    pub force_terminate_timeout_ms: u64,

    /// Capacity of the broadcast channel carrying diagnostic events.
    pub event_channel_capacity: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_period_ms: 5000,
            force_terminate_timeout_ms: 500,
            event_channel_capacity: 1000,
        }
    }
}

impl SequencerConfig {
    /// Shutdown grace period as a `Duration`
    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_period_ms)
    }

    /// Force-terminate timeout as a `Duration`
    pub fn force_terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.force_terminate_timeout_ms)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.event_channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "event_channel_capacity",
                "0",
                "must be greater than zero",
            ));
        }

        if self.shutdown_grace_period_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "shutdown_grace_period_ms",
                "0",
                "shutdown must allow in-flight callbacks some time to settle",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SequencerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_accessors() {
        let config = SequencerConfig {
            shutdown_grace_period_ms: 1500,
            force_terminate_timeout_ms: 250,
            event_channel_capacity: 16,
        };
        assert_eq!(config.shutdown_grace_period(), Duration::from_millis(1500));
        assert_eq!(config.force_terminate_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = SequencerConfig {
            event_channel_capacity: 0,
            ..SequencerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: SequencerConfig =
            serde_yaml::from_str("shutdown_grace_period_ms: 250").unwrap();
        assert_eq!(config.shutdown_grace_period_ms, 250);
        assert_eq!(
            config.event_channel_capacity,
            SequencerConfig::default().event_channel_capacity
        );
    }
}
