//! Circuit breaker registry for managing one breaker per remote dependency

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::breaker::CircuitBreaker;
use super::types::{CircuitBreakerConfig, CircuitBreakerStats};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Collection of circuit breakers keyed by dependency name
///
/// Construct one registry and pass it (or the breakers it hands out) to every layer
/// that talks to the remote service, so all callers of a dependency share its
/// breaker.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    /// Create a new registry with default config
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a registry with custom default config
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config: config,
        }
    }

    /// Get or create a circuit breaker for a dependency
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::with_config(
                    name,
                    self.default_config.clone(),
                ))
            })
            .clone()
    }

    /// Get or create with custom config
    ///
    /// The config only applies when the breaker does not exist yet.
    pub fn get_with_config(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::with_config(name, config)))
            .clone()
    }

    /// Get all circuit breaker names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Get stats for all circuit breakers, sorted by name
    pub fn all_stats(&self) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<CircuitBreakerStats> =
            self.breakers.iter().map(|e| e.value().stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Reset all circuit breakers
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    /// Log every breaker's statistics once per `monitoring_period` (at least 1ms)
    ///
    /// Stops when `cancel` fires or the registry is dropped.
    pub fn spawn_monitor(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        let period = self.default_config.monitoring_period.max(MIN_PERIOD);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(registry) = registry.upgrade() else { break };
                        for stats in registry.all_stats() {
                            tracing::info!(
                                circuit = %stats.name,
                                state = %stats.state,
                                failures = stats.failure_count,
                                total_calls = stats.total_calls,
                                rejections = stats.total_rejections,
                                failure_rate = stats.failure_rate(),
                                "Circuit breaker status"
                            );
                        }
                    }
                }
            }
        })
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
