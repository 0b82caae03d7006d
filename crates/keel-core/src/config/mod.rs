//! Configuration management for Keel
//!
//! Effective configuration is built in three steps: a file (JSON, TOML or YAML,
//! chosen by extension), then `KEEL_*` environment overrides, then validation.

mod env_loader;
mod file_loader;
mod logging_config;
mod model;
mod validation;

pub use env_loader::{apply_env_overrides, apply_overrides_from};
pub use file_loader::load_from_file;
pub use logging_config::{LogFormat, LoggingConfig};
pub use model::KeelConfig;
pub use validation::ConfigValidator;

use crate::error::KeelResult;
use std::path::Path;

/// Load configuration from `path` (defaults if absent), apply environment
/// overrides and validate the result
pub fn load_config(path: Option<&Path>) -> KeelResult<KeelConfig> {
    let mut config = match path {
        Some(path) => load_from_file(path)?,
        None => KeelConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    ConfigValidator::validate(&config)?;

    tracing::debug!(
        file = ?path,
        breaker_failure_threshold = config.circuit_breaker.failure_threshold,
        cache_max_entries = config.cache.max_entries,
        loader_max_concurrent = config.loader.max_concurrent_queries,
        "Configuration loaded"
    );
    Ok(config)
}
