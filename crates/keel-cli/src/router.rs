//! Command routing logic for CLI

use crate::args::{Cli, Commands, ConfigAction};
use crate::commands;
use crate::console::CliConsole;
use anyhow::Result;
use keel_core::config::KeelConfig;
use keel_core::error::KeelResult;

/// Route CLI commands to their respective handlers
///
/// `loaded` is the outcome of reading the configuration; `config validate`
/// reports a failure itself, every other command propagates it.
pub async fn route(cli: Cli, loaded: KeelResult<KeelConfig>) -> Result<()> {
    let source = cli.config.as_deref();
    match &cli.command {
        Commands::Config {
            action: ConfigAction::Validate,
        } => match loaded {
            Ok(config) => commands::config::validate(&config, source),
            Err(e) => {
                CliConsole::new(true).error(&format!("Configuration is invalid: {}", e));
                Err(e.into())
            }
        },
        Commands::Config {
            action: ConfigAction::Show,
        } => commands::config::show(&loaded?, source, cli.verbose),
        Commands::Simulate(args) => {
            let report = commands::simulate::run(&loaded?, args, cli.verbose).await?;
            commands::simulate::print_report(&report, args.json)
        }
    }
}
