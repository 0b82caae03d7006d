//! Terminal output helpers for the `keel` binary

use colored::*;
use std::fmt::Display;

/// Writes status lines and aligned report rows
///
/// Errors go to stderr; everything else goes to stdout so `--json` output stays
/// machine-readable when only stdout is captured.
pub struct CliConsole {
    verbose: bool,
}

impl CliConsole {
    pub const fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Progress chatter, shown only with `--verbose`
    pub fn info(&self, message: &str) {
        if self.verbose {
            println!("{} {}", "·".cyan(), message.dimmed());
        }
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", "ok".green().bold(), message);
    }

    pub fn warn(&self, message: &str) {
        println!("{} {}", "warn".yellow().bold(), message.yellow());
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "error".red().bold(), message);
    }

    /// Blank line, then an underlined section title
    pub fn print_header(&self, title: &str) {
        println!("\n{}", title.bold().underline());
    }

    pub fn field(&self, label: &str, value: impl Display) {
        println!("  {:<26} {}", format!("{}:", label).dimmed(), value);
    }
}
