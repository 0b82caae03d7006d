//! Environment variable-based configuration overrides

use crate::config::model::KeelConfig;
use crate::error::{KeelError, KeelResult};
use std::str::FromStr;
use std::time::Duration;

/// Apply `KEEL_*` environment variables on top of `config`
///
/// Recognized variables:
/// - `KEEL_BREAKER_FAILURE_THRESHOLD`, `KEEL_BREAKER_RECOVERY_TIMEOUT`
/// - `KEEL_CACHE_MAX_ENTRIES`, `KEEL_CACHE_MAX_SIZE`, `KEEL_CACHE_DEFAULT_TTL`
/// - `KEEL_EXECUTOR_TIMEOUT`, `KEEL_EXECUTOR_RETRIES`
/// - `KEEL_LOADER_MAX_CONCURRENT`
/// - `KEEL_LOG_LEVEL`, `KEEL_LOG_FORMAT`
///
/// Durations use humantime syntax (`"30s"`, `"250ms"`).
pub fn apply_env_overrides(config: &mut KeelConfig) -> KeelResult<()> {
    apply_overrides_from(config, |name| std::env::var(name).ok())
}

/// Apply overrides from an arbitrary variable lookup
pub fn apply_overrides_from<F>(config: &mut KeelConfig, lookup: F) -> KeelResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = parsed(&lookup, "KEEL_BREAKER_FAILURE_THRESHOLD")? {
        config.circuit_breaker.failure_threshold = value;
    }
    if let Some(value) = duration(&lookup, "KEEL_BREAKER_RECOVERY_TIMEOUT")? {
        config.circuit_breaker.recovery_timeout = value;
    }

    if let Some(value) = parsed(&lookup, "KEEL_CACHE_MAX_ENTRIES")? {
        config.cache.max_entries = value;
    }
    if let Some(value) = parsed(&lookup, "KEEL_CACHE_MAX_SIZE")? {
        config.cache.max_size = value;
    }
    if let Some(value) = duration(&lookup, "KEEL_CACHE_DEFAULT_TTL")? {
        config.cache.default_ttl = value;
    }

    if let Some(value) = duration(&lookup, "KEEL_EXECUTOR_TIMEOUT")? {
        config.executor.timeout = value;
    }
    if let Some(value) = parsed(&lookup, "KEEL_EXECUTOR_RETRIES")? {
        config.executor.retries = value;
    }

    if let Some(value) = parsed(&lookup, "KEEL_LOADER_MAX_CONCURRENT")? {
        config.loader.max_concurrent_queries = value;
    }

    if let Some(level) = lookup("KEEL_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(format) = parsed(&lookup, "KEEL_LOG_FORMAT")? {
        config.logging.format = format;
    }

    Ok(())
}

fn parsed<F, T>(lookup: &F, name: &str) -> KeelResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| KeelError::config(format!("Invalid {} value: '{}'", name, raw))),
        None => Ok(None),
    }
}

fn duration<F>(lookup: &F, name: &str) -> KeelResult<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => humantime_serde::re::humantime::parse_duration(raw.trim())
            .map(Some)
            .map_err(|e| KeelError::config(format!("Invalid {} value '{}': {}", name, raw, e))),
        None => Ok(None),
    }
}
