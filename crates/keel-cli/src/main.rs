//! Keel command-line interface
//!
//! - `keel config show` prints the effective configuration
//! - `keel config validate` checks a configuration file and its `KEEL_*` overrides
//! - `keel simulate` drives a progressive load through the resilience stack
//!   against a deterministic flaky service and prints breaker, cache and
//!   executor statistics
//!
//! Logging goes to stderr. `RUST_LOG` overrides the configured level.

mod args;
mod commands;
mod console;
mod router;
mod service;

use args::Cli;
use clap::Parser;
use keel_core::config::{LogFormat, LoggingConfig, load_config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let loaded = load_config(cli.config.as_deref());

    let logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    init_tracing(&logging, cli.verbose);

    router::route(cli, loaded).await
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.directive(verbose)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}
