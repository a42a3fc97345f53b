//! Executor configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the in-process worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Enable/disable the worker pool.
    /// When disabled, jobs stay pending until an external executor claims them.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Number of concurrent workers. Each runs one job at a time.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How often an idle worker polls for pending jobs (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_workers() -> usize {
    2
}

fn default_poll_interval() -> u64 {
    1000 // 1 second
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            workers: default_workers(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExecutorConfig::default();
        assert!(config.enabled);
        assert_eq!(config.workers, 2);
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn test_deserialize_minimal() {
        let toml = r#"
            workers = 4
        "#;
        let config: ExecutorConfig = toml::from_str(toml).unwrap();
        assert!(config.enabled);
        assert_eq!(config.workers, 4);
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn test_deserialize_disabled() {
        let config: ExecutorConfig = toml::from_str("enabled = false").unwrap();
        assert!(!config.enabled);
    }
}
