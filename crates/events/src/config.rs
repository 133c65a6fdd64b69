//! Configuration for the message bus and its circuit breakers.

use std::time::Duration;

use concord_core::Error;
use serde::{Deserialize, Serialize};

/// Configuration for the message bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Failures inside the window that open a subscriber's breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Sliding window for counting failures, in milliseconds.
    #[serde(default = "default_failure_window_ms")]
    pub failure_window_ms: u64,

    /// Cooldown after the breaker first opens, in milliseconds.
    #[serde(default = "default_base_cooldown_ms")]
    pub base_cooldown_ms: u64,

    /// Upper bound for the backed-off cooldown, in milliseconds.
    #[serde(default = "default_max_cooldown_ms")]
    pub max_cooldown_ms: u64,

    /// Cooldown multiplier applied each time a half-open probe fails.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,

    /// A handler running longer than this counts as a failure, in milliseconds.
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,

    /// Number of recently published messages kept for inspection.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            failure_window_ms: default_failure_window_ms(),
            base_cooldown_ms: default_base_cooldown_ms(),
            max_cooldown_ms: default_max_cooldown_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            handler_timeout_ms: default_handler_timeout_ms(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl BusConfig {
    /// Set the failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the failure window.
    #[must_use]
    pub const fn with_failure_window(mut self, window: Duration) -> Self {
        self.failure_window_ms = duration_ms(window);
        self
    }

    /// Set the base and maximum cooldown.
    #[must_use]
    pub const fn with_cooldown(mut self, base: Duration, max: Duration) -> Self {
        self.base_cooldown_ms = duration_ms(base);
        self.max_cooldown_ms = duration_ms(max);
        self
    }

    /// Set the handler timeout.
    #[must_use]
    pub const fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the history capacity.
    #[must_use]
    pub const fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Failure window as a `Duration`.
    #[must_use]
    pub const fn failure_window(&self) -> Duration {
        Duration::from_millis(self.failure_window_ms)
    }

    /// Base cooldown as a `Duration`.
    #[must_use]
    pub const fn base_cooldown(&self) -> Duration {
        Duration::from_millis(self.base_cooldown_ms)
    }

    /// Maximum cooldown as a `Duration`.
    #[must_use]
    pub const fn max_cooldown(&self) -> Duration {
        Duration::from_millis(self.max_cooldown_ms)
    }

    /// Handler timeout as a `Duration`.
    #[must_use]
    pub const fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> concord_core::Result<()> {
        if self.failure_threshold == 0 {
            return Err(Error::invalid_config(
                "bus.failure_threshold",
                "must be greater than 0",
            ));
        }
        if self.failure_window_ms == 0 {
            return Err(Error::invalid_config(
                "bus.failure_window_ms",
                "must be greater than 0",
            ));
        }
        if self.max_cooldown_ms < self.base_cooldown_ms {
            return Err(Error::invalid_config(
                "bus.max_cooldown_ms",
                "must not be smaller than base_cooldown_ms",
            ));
        }
        if self.backoff_multiplier == 0 {
            return Err(Error::invalid_config(
                "bus.backoff_multiplier",
                "must be at least 1",
            ));
        }
        if self.handler_timeout_ms == 0 {
            return Err(Error::invalid_config(
                "bus.handler_timeout_ms",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

const fn duration_ms(duration: Duration) -> u64 {
    let millis = duration.as_millis();
    if millis > u64::MAX as u128 {
        u64::MAX
    } else {
        millis as u64
    }
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_failure_window_ms() -> u64 {
    60_000
}

const fn default_base_cooldown_ms() -> u64 {
    10_000
}

const fn default_max_cooldown_ms() -> u64 {
    300_000
}

const fn default_backoff_multiplier() -> u32 {
    2
}

const fn default_handler_timeout_ms() -> u64 {
    30_000
}

const fn default_history_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(BusConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let config = BusConfig::default().with_failure_threshold(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cooldown_bounds_checked() {
        let config = BusConfig::default()
            .with_cooldown(Duration::from_secs(10), Duration::from_secs(1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: concord_core::Result<BusConfig> =
            concord_core::parse::from_toml_str("failure_threshold = 3\n");
        let config = parsed.ok();
        assert_eq!(config.as_ref().map(|c| c.failure_threshold), Some(3));
        assert_eq!(config.map(|c| c.history_capacity), Some(100));
    }
}
