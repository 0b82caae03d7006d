//! Circuit breaker pattern for fault tolerance
//!
//! Prevents cascading failures by failing fast while a remote dependency is unhealthy.
//! Create one breaker per logical dependency and share it; the registry hands out
//! those shared instances by name.

mod breaker;
mod registry;
mod types;

#[cfg(test)]
mod tests;

pub use breaker::CircuitBreaker;
pub use registry::CircuitBreakerRegistry;
pub use types::{CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
