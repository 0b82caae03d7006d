//! Constructor methods for KeelError

use super::types::KeelError;
use std::time::Duration;

impl KeelError {
    /// Create a timeout error for the given deadline
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }

    /// Create an aborted error
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Create a circuit-open rejection
    pub fn circuit_open(name: impl Into<String>, retry_in: Duration) -> Self {
        Self::CircuitOpen {
            name: name.into(),
            retry_in,
        }
    }

    /// Create an opaque operation failure
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
            context: None,
        }
    }

    /// Create an operation failure with context
    pub fn operation_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a new cache error
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a configuration error with context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a new invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
        }
    }

    /// Create an invalid input error with field
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new JSON error
    pub fn json(message: impl Into<String>) -> Self {
        Self::Json {
            message: message.into(),
        }
    }

    /// Create a new IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }
}
