//! Configuration for chaincode invocation

use crate::retry::DEFAULT_RETRY_ATTEMPTS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Invoker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// How long to wait for the commit event (milliseconds)
    pub event_wait_time_ms: u64,

    /// Retry budget used when the caller does not supply one
    pub default_retry_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "chaincode-invoke".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            event_wait_time_ms: 30_000, // 30 seconds
            default_retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(wait) = std::env::var("INVOKE_EVENT_WAIT_TIME") {
            config.event_wait_time_ms = wait.trim().parse().map_err(|e| {
                crate::Error::Config(format!("Invalid INVOKE_EVENT_WAIT_TIME '{}': {}", wait, e))
            })?;
        }

        if let Ok(attempts) = std::env::var("INVOKE_RETRY_ATTEMPTS") {
            config.default_retry_attempts = attempts.trim().parse().map_err(|e| {
                crate::Error::Config(format!(
                    "Invalid INVOKE_RETRY_ATTEMPTS '{}': {}",
                    attempts, e
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the invoker cannot work with
    pub fn validate(&self) -> crate::Result<()> {
        if self.event_wait_time_ms == 0 {
            return Err(crate::Error::Config(
                "event_wait_time_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Commit event wait as a duration
    pub fn event_wait_time(&self) -> Duration {
        Duration::from_millis(self.event_wait_time_ms)
    }
}
