//! CLI argument definitions using clap
//!
//! - keel config show          # Print the effective configuration
//! - keel config validate      # Check a configuration file
//! - keel simulate             # Progressive load against a flaky in-process service

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "keel")]
#[command(about = "Keel - circuit breaking, caching and progressive loading for flaky data services")]
#[command(version)]
pub struct Cli {
    /// Path to a configuration file (JSON, TOML or YAML)
    #[arg(long, global = true, env = "KEEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG still takes precedence)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run a progressive load against a simulated flaky service
    Simulate(SimulateArgs),
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration (file, then KEEL_* overrides) as JSON
    Show,

    /// Load and validate the configuration, reporting the first problem
    Validate,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Number of loaders to register
    #[arg(long, default_value_t = 8)]
    pub loaders: usize,

    /// Every Nth service call fails (0 disables failures)
    #[arg(long, default_value_t = 4)]
    pub fail_every: u32,

    /// Simulated service latency per call, in milliseconds
    #[arg(long, default_value_t = 50)]
    pub latency_ms: u64,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}
