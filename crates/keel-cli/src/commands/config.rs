//! Configuration management commands

use crate::console::CliConsole;
use anyhow::{Context, Result};
use keel_core::config::KeelConfig;
use std::path::Path;

/// Print the effective configuration as JSON
pub fn show(config: &KeelConfig, source: Option<&Path>, verbose: bool) -> Result<()> {
    let console = CliConsole::new(verbose);
    match source {
        Some(path) if path.exists() => console.info(&format!("Loaded configuration from: {}", path.display())),
        Some(path) => console.info(&format!(
            "Configuration file not found: {}, using defaults",
            path.display()
        )),
        None => console.info("No configuration file given, using defaults"),
    }

    let rendered =
        serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
    println!("{}", rendered);
    Ok(())
}

/// Report that the configuration loaded and passed validation
pub fn validate(config: &KeelConfig, source: Option<&Path>) -> Result<()> {
    let console = CliConsole::new(true);
    console.print_header("Configuration Validation");
    if let Some(path) = source {
        console.field("file", path.display());
    }
    console.success("Configuration is valid");

    console.field("breaker failure threshold", config.circuit_breaker.failure_threshold);
    console.field("cache max entries", config.cache.max_entries);
    console.field("executor timeout", format!("{:?}", config.executor.timeout));
    console.field("loader concurrency", config.loader.max_concurrent_queries);
    Ok(())
}
