//! From trait implementations for KeelError conversions

use super::types::KeelError;

impl From<std::io::Error> for KeelError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<serde_json::Error> for KeelError {
    fn from(error: serde_json::Error) -> Self {
        Self::json(error.to_string())
    }
}

impl From<regex::Error> for KeelError {
    fn from(error: regex::Error) -> Self {
        Self::invalid_input_field(error.to_string(), "pattern")
    }
}

impl From<tokio::time::error::Elapsed> for KeelError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::operation("deadline elapsed")
    }
}

impl From<toml::de::Error> for KeelError {
    fn from(error: toml::de::Error) -> Self {
        Self::config(format!("Failed to parse TOML config: {}", error))
    }
}

impl From<serde_yaml::Error> for KeelError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::config(format!("Failed to parse YAML config: {}", error))
    }
}
