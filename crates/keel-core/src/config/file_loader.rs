//! Loading `KeelConfig` from JSON, TOML or YAML files

use crate::config::model::KeelConfig;
use crate::error::{KeelError, KeelResult};
use std::fmt::Display;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy)]
enum FileFormat {
    Json,
    Toml,
    Yaml,
}

impl FileFormat {
    /// Unknown or missing extensions are read as JSON
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::Toml,
            Some("yaml" | "yml") => Self::Yaml,
            _ => Self::Json,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Json => "JSON",
            Self::Toml => "TOML",
            Self::Yaml => "YAML",
        }
    }
}

/// Read a configuration file, picking the format from its extension
///
/// A path that does not exist yields the defaults.
pub fn load_from_file(path: &Path) -> KeelResult<KeelConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        return Ok(KeelConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        KeelError::config_with_context(
            format!("Failed to read config file: {}", e),
            format!("Reading configuration from '{}'", path.display()),
        )
    })?;

    let format = FileFormat::of(path);
    let parsed: KeelResult<KeelConfig> = match format {
        FileFormat::Json => serde_json::from_str(&content).map_err(|e| parse_error(format, path, e)),
        FileFormat::Toml => toml::from_str(&content).map_err(|e| parse_error(format, path, e)),
        FileFormat::Yaml => serde_yaml::from_str(&content).map_err(|e| parse_error(format, path, e)),
    };
    tracing::debug!(path = %path.display(), format = format.label(), "Configuration file read");
    parsed
}

fn parse_error(format: FileFormat, path: &Path, error: impl Display) -> KeelError {
    KeelError::config_with_context(
        format!("Failed to parse {} config: {}", format.label(), error),
        format!("Parsing '{}'", path.display()),
    )
}
