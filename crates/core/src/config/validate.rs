use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Executor has at least one worker when enabled
/// - Version allocation makes at least one attempt and its backoff bounds are ordered
/// - Artifact extension is a plain alphanumeric suffix
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.executor.enabled && config.executor.workers == 0 {
        return Err(ConfigError::ValidationError(
            "executor.workers must be at least 1 when the executor is enabled".to_string(),
        ));
    }

    if config.versioning.max_allocation_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "versioning.max_allocation_attempts cannot be 0".to_string(),
        ));
    }

    if config.versioning.initial_backoff_ms > config.versioning.max_backoff_ms {
        return Err(ConfigError::ValidationError(format!(
            "versioning.initial_backoff_ms ({}) exceeds versioning.max_backoff_ms ({})",
            config.versioning.initial_backoff_ms, config.versioning.max_backoff_ms
        )));
    }

    let ext = &config.storage.artifact_extension;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConfigError::ValidationError(format!(
            "storage.artifact_extension must be non-empty and alphanumeric, got {:?}",
            ext
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_workers() {
        let mut config = Config::default();
        config.executor.workers = 0;
        assert!(validate_config(&config).is_err());

        // A disabled executor doesn't need workers
        config.executor.enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_allocation_bounds() {
        let mut config = Config::default();
        config.versioning.max_allocation_attempts = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.versioning.initial_backoff_ms = 5000;
        config.versioning.max_backoff_ms = 100;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_artifact_extension() {
        let mut config = Config::default();
        config.storage.artifact_extension = "../x".to_string();
        assert!(validate_config(&config).is_err());

        config.storage.artifact_extension = String::new();
        assert!(validate_config(&config).is_err());

        config.storage.artifact_extension = "pkl".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
