//! Keel Core Library
//!
//! Client-side resilience and progressive loading for slow or flaky data
//! services: a circuit breaker, a TTL cache with usage-weighted eviction, a
//! timeout-and-retry executor with cancellation, and a priority- and
//! dependency-aware progressive loader that ties them together.

pub mod cache;
pub mod config;
pub mod error;
pub mod loader;
pub mod recovery;
pub mod resilient;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheKeyBuilder, CacheStats, SmartCache};
pub use config::{KeelConfig, LoggingConfig, load_config};
pub use error::{KeelError, KeelResult, ResultExt};
pub use loader::{
    LoaderConfig, LoaderDescriptor, LoaderSnapshot, LoadingPhase, LoadingState, ProgressiveLoader,
    Subscription,
};
pub use recovery::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStats,
    CircuitState, ExecuteOptions, ExecutionHooks, ExecutionOutcome, TimeoutConfig,
    TimeoutExecutor, with_timeout,
};
pub use resilient::{DataSource, Query, ResilientFetcher};

/// Commonly used items in one import
pub mod prelude {
    pub use crate::cache::{CacheConfig, CacheKeyBuilder, SmartCache};
    pub use crate::error::{KeelError, KeelResult};
    pub use crate::loader::{LoaderConfig, LoaderDescriptor, LoadingPhase, ProgressiveLoader};
    pub use crate::recovery::{
        CircuitBreaker, CircuitBreakerConfig, CircuitState, ExecuteOptions, TimeoutConfig,
        TimeoutExecutor,
    };
    pub use crate::resilient::{DataSource, Query, ResilientFetcher};
}
