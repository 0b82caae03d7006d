//! Failure handling for calls to slow or flaky dependencies
//!
//! This module provides:
//! - Circuit breakers that fail fast while a dependency is unhealthy
//! - A timeout executor with retries, backoff and cooperative cancellation
//! - Backoff delay calculation shared by both

pub mod backoff;
pub mod circuit_breaker;
pub mod timeout;

pub use backoff::{BackoffStrategy, ConstantBackoff, ExponentialBackoff, backoff_delay};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStats,
    CircuitState,
};
pub use timeout::{
    ExecuteOptions, ExecutionHooks, ExecutionOutcome, OperationStats, TimeoutConfig,
    TimeoutExecutor, with_timeout,
};
