//! Top-level configuration model

use serde::{Deserialize, Serialize};

use super::logging_config::LoggingConfig;
use crate::cache::CacheConfig;
use crate::loader::LoaderConfig;
use crate::recovery::circuit_breaker::CircuitBreakerConfig;
use crate::recovery::timeout::TimeoutConfig;

/// Every tunable of the resilience layer
///
/// Missing sections and fields fall back to their defaults, so an empty file
/// is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeelConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub cache: CacheConfig,
    pub executor: TimeoutConfig,
    pub loader: LoaderConfig,
    pub logging: LoggingConfig,
}
