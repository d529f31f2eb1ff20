//! Configuration validation.
//!
//! Only structural problems that make the whole document unusable are
//! errors here — per-entry problems (unknown types, duplicate ids, missing
//! refs) are detected during load, where they are logged, counted, and
//! skipped without aborting the rest of the topology.

use super::error::{ConfigError, ConfigResult};
use super::schema::AgentConfig;

/// Validates the entire configuration document.
pub fn validate_config(config: &AgentConfig) -> ConfigResult<()> {
    if config.config_interval == 0 {
        return Err(ConfigError::validation(
            "ConfigInterval must be greater than 0",
        ));
    }

    if config.metrics.interval_seconds == 0 {
        return Err(ConfigError::validation(
            "Metrics.IntervalSeconds must be greater than 0",
        ));
    }

    for pipe in &config.pipes {
        if pipe.id.trim().is_empty() {
            return Err(ConfigError::validation("Pipe entries must declare an Id"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PipeEntry;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&AgentConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_config_interval() {
        let config = AgentConfig {
            config_interval: 0,
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_blank_pipe_id() {
        let config = AgentConfig {
            pipes: vec![PipeEntry::default()],
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }
}
