//! Configuration validation

use crate::config::model::KeelConfig;
use crate::error::{KeelError, KeelResult};
use std::time::Duration;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a complete configuration
    pub fn validate(config: &KeelConfig) -> KeelResult<()> {
        Self::validate_breaker(config)?;
        Self::validate_cache(config)?;
        Self::validate_executor(config)?;
        Self::validate_loader(config)?;
        Self::validate_logging(config)?;
        Ok(())
    }

    fn validate_breaker(config: &KeelConfig) -> KeelResult<()> {
        let breaker = &config.circuit_breaker;
        positive("circuit_breaker.failure_threshold", breaker.failure_threshold as u64)?;
        positive("circuit_breaker.success_threshold", breaker.success_threshold as u64)?;
        non_zero("circuit_breaker.recovery_timeout", breaker.recovery_timeout)?;
        non_zero("circuit_breaker.monitoring_period", breaker.monitoring_period)
    }

    fn validate_cache(config: &KeelConfig) -> KeelResult<()> {
        let cache = &config.cache;
        positive("cache.max_entries", cache.max_entries as u64)?;
        positive("cache.max_size", cache.max_size as u64)?;
        non_zero("cache.default_ttl", cache.default_ttl)?;
        non_zero("cache.cleanup_interval", cache.cleanup_interval)
    }

    fn validate_executor(config: &KeelConfig) -> KeelResult<()> {
        non_zero("executor.timeout", config.executor.timeout)
    }

    fn validate_loader(config: &KeelConfig) -> KeelResult<()> {
        positive(
            "loader.max_concurrent_queries",
            config.loader.max_concurrent_queries as u64,
        )
    }

    fn validate_logging(config: &KeelConfig) -> KeelResult<()> {
        let logging = &config.logging;
        if !LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
            return Err(KeelError::config(format!(
                "Unknown log level '{}'. Valid levels are: {:?}",
                logging.level, LOG_LEVELS
            )));
        }
        Ok(())
    }
}

fn positive(field: &str, value: u64) -> KeelResult<()> {
    if value == 0 {
        return Err(KeelError::config(format!("{} must be greater than 0", field)));
    }
    Ok(())
}

fn non_zero(field: &str, value: Duration) -> KeelResult<()> {
    if value.is_zero() {
        return Err(KeelError::config(format!("{} must be a non-zero duration", field)));
    }
    Ok(())
}
