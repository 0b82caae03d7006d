//! Core error types for Keel

use std::time::Duration;
use thiserror::Error;

/// Result type alias for Keel operations
pub type KeelResult<T> = Result<T, KeelError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C: std::fmt::Display>(self, context: C) -> KeelResult<T>;

    /// Add context lazily (only evaluated on error)
    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> KeelResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn context<C: std::fmt::Display>(self, context: C) -> KeelResult<T> {
        self.map_err(|e| KeelError::operation(format!("{}: {}", context, e)))
    }

    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> KeelResult<T> {
        self.map_err(|e| KeelError::operation(format!("{}: {}", f(), e)))
    }
}

/// Main error type for Keel
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KeelError {
    /// Operation did not settle before its deadline
    #[error("Operation timed out after {}ms", timeout.as_millis())]
    Timeout { timeout: Duration },

    /// Operation was cancelled by its caller
    #[error("Operation aborted: {reason}")]
    Aborted { reason: String },

    /// Circuit breaker rejected the call without invoking the operation
    #[error("Circuit breaker '{name}' is open, retry in {}ms", retry_in.as_millis())]
    CircuitOpen { name: String, retry_in: Duration },

    /// Failure reported by a wrapped operation
    #[error("Operation failed: {message}")]
    Operation {
        message: String,
        context: Option<String>,
    },

    /// Cache admission or payload errors
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// Invalid input errors
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// IO errors
    #[error("IO error: {message}")]
    Io { message: String },
}

impl KeelError {
    /// Get the error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "KEEL_TIMEOUT",
            Self::Aborted { .. } => "KEEL_ABORTED",
            Self::CircuitOpen { .. } => "KEEL_CIRCUIT_OPEN",
            Self::Operation { .. } => "KEEL_OPERATION",
            Self::Cache { .. } => "KEEL_CACHE",
            Self::Config { .. } => "KEEL_CONFIG",
            Self::InvalidInput { .. } => "KEEL_INVALID_INPUT",
            Self::Json { .. } => "KEEL_JSON",
            Self::Io { .. } => "KEEL_IO",
        }
    }

    /// Whether another attempt could succeed where this one failed
    ///
    /// Deadlines, remote failures and I/O errors are transient. Cancellation,
    /// an open circuit and local errors (bad input, config, cache, JSON) are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Operation { .. } | Self::Io { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}
