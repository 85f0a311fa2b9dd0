//! Configuration for the synchronization layer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::backoff::RetryConfig;
use crate::errors::{ControlTowerError, Result};

/// Timing knobs shared by every subscription of an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Window in milliseconds over which a burst of notices collapses into
    /// one recompute.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Poll interval in milliseconds while degraded.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound in milliseconds on one fetch of an input set.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Consecutive failed refreshes before the cached value is marked stale.
    #[serde(default = "default_stale_after_failures")]
    pub stale_after_failures: u32,
    /// Backoff applied on top of the poll interval while refreshes fail.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_debounce_ms() -> u64 {
    50
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_stale_after_failures() -> u32 {
    3
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            stale_after_failures: default_stale_after_failures(),
            retry: RetryConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the debounce window.
    #[must_use]
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// Sets the degraded poll interval.
    #[must_use]
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Sets the fetch timeout.
    #[must_use]
    pub fn with_fetch_timeout_ms(mut self, ms: u64) -> Self {
        self.fetch_timeout_ms = ms;
        self
    }

    /// Sets the failure count after which values are marked stale.
    #[must_use]
    pub fn with_stale_after_failures(mut self, failures: u32) -> Self {
        self.stale_after_failures = failures;
        self
    }

    /// Sets the retry backoff.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Gets the debounce window as Duration.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Gets the poll interval as Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Gets the fetch timeout as Duration.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Rejects values that would stall or spin the workers.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(ControlTowerError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(ControlTowerError::Config(
                "fetch_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.stale_after_failures == 0 {
            return Err(ControlTowerError::Config(
                "stale_after_failures must be at least 1".to_string(),
            ));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ControlTowerError::Config(format!(
                "retry.max_delay_ms ({}) is below retry.base_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::backoff::JitterStrategy;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.debounce(), Duration::from_millis(50));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.stale_after_failures, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config =
            SyncConfig::from_json(r#"{"poll_interval_ms": 250, "retry": {"jitter": "equal"}}"#)
                .unwrap();

        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.retry.jitter, JitterStrategy::Equal);
        assert_eq!(config.retry.base_delay_ms, 500);
    }

    #[test]
    fn test_from_json_rejects_zero_interval() {
        let err = SyncConfig::from_json(r#"{"poll_interval_ms": 0}"#).unwrap_err();
        assert!(matches!(err, ControlTowerError::Config(_)));
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        let err = SyncConfig::from_json("{").unwrap_err();
        assert!(matches!(err, ControlTowerError::Serialization(_)));
    }

    #[test]
    fn test_validate_retry_bounds() {
        let config = SyncConfig::new().with_retry(
            RetryConfig::new()
                .with_base_delay_ms(1_000)
                .with_max_delay_ms(10),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder() {
        let config = SyncConfig::new()
            .with_debounce_ms(5)
            .with_poll_interval_ms(20)
            .with_fetch_timeout_ms(100)
            .with_stale_after_failures(2);

        assert_eq!(config.debounce(), Duration::from_millis(5));
        assert_eq!(config.poll_interval(), Duration::from_millis(20));
        assert_eq!(config.fetch_timeout(), Duration::from_millis(100));
        assert_eq!(config.stale_after_failures, 2);
    }
}
