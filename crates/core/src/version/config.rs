//! Version allocation configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy for version allocation under contention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// Attempts before allocation gives up with a contention error.
    #[serde(default = "default_max_attempts")]
    pub max_allocation_attempts: u32,

    /// Backoff before the first retry (milliseconds). Doubles per attempt.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single backoff sleep (milliseconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    30
}

fn default_initial_backoff() -> u64 {
    25
}

fn default_max_backoff() -> u64 {
    2000
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_allocation_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl AllocationConfig {
    /// Sleep before retry number `attempt` (1-based), capped at `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AllocationConfig::default();
        assert_eq!(config.max_allocation_attempts, 30);
        assert_eq!(config.initial_backoff_ms, 25);
        assert_eq!(config.max_backoff_ms, 2000);
    }

    #[test]
    fn test_deserialize_minimal() {
        let config: AllocationConfig = toml::from_str("max_allocation_attempts = 5").unwrap();
        assert_eq!(config.max_allocation_attempts, 5);
        assert_eq!(config.initial_backoff_ms, 25);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = AllocationConfig {
            max_allocation_attempts: 10,
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
        };
        assert_eq!(config.backoff(1), Duration::from_millis(10));
        assert_eq!(config.backoff(2), Duration::from_millis(20));
        assert_eq!(config.backoff(3), Duration::from_millis(40));
        assert_eq!(config.backoff(4), Duration::from_millis(50));
        assert_eq!(config.backoff(40), Duration::from_millis(50));
    }
}
