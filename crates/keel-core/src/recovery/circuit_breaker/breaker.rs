//! Circuit breaker implementation

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use super::types::{CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
use crate::error::{KeelError, KeelResult};

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<DateTime<Utc>>,
    /// Recovery deadline, set whenever the circuit opens
    next_attempt: Option<Instant>,
    total_calls: u64,
    total_failures: u64,
    total_rejections: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            next_attempt: None,
            total_calls: 0,
            total_failures: 0,
            total_rejections: 0,
        }
    }
}

/// Circuit breaker for protecting against failing dependencies
///
/// State is kept behind a short synchronous lock that is never held across an
/// `.await`, so the guarded operation itself runs unlocked and concurrent callers
/// may overlap. In half-open state any overlapping probe that fails reopens the
/// circuit; treat [`CircuitBreaker::state`] as a hint, not a mutex.
///
/// # Example
/// ```no_run
/// use keel_core::recovery::{CircuitBreaker, CircuitBreakerConfig};
/// use keel_core::KeelResult;
///
/// # async fn example() -> KeelResult<()> {
/// let breaker = CircuitBreaker::with_config("inventory", CircuitBreakerConfig::default());
/// let rows = breaker.execute(|| async { Ok::<_, keel_core::KeelError>(vec![1, 2, 3]) }).await?;
/// assert_eq!(rows.len(), 3);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Logical dependency name (for logging and errors)
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default config
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    /// Create a new circuit breaker with custom config
    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    /// Get the dependency name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state
    ///
    /// An open circuit whose deadline has passed still reports `Open`; it moves to
    /// half-open on the next guarded call.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn success_count(&self) -> u32 {
        self.inner.lock().success_count
    }

    /// Whether a call made now would reach the operation
    pub fn is_call_permitted(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => inner
                .next_attempt
                .is_none_or(|deadline| Instant::now() >= deadline),
        }
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// Returns [`KeelError::CircuitOpen`] without invoking `operation` while the
    /// circuit is open and the recovery deadline has not passed. Errors from the
    /// operation are counted and returned unchanged.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> KeelResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = KeelResult<T>>,
    {
        self.acquire()?;

        match operation().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                tracing::debug!(circuit = %self.name, error = %e, "Guarded call failed");
                self.record_failure();
                Err(e)
            }
        }
    }

    /// Admit or reject a call, moving an expired open circuit to half-open
    fn acquire(&self) -> KeelResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let now = Instant::now();
        match inner.next_attempt {
            Some(deadline) if now < deadline => {
                inner.total_rejections += 1;
                Err(KeelError::circuit_open(&self.name, deadline - now))
            }
            _ => {
                inner.state = CircuitState::HalfOpen;
                inner.success_count = 0;
                tracing::info!(circuit = %self.name, "Circuit breaker transitioning to half-open");
                Ok(())
            }
        }
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;
        inner.failure_count = 0;

        if inner.state == CircuitState::HalfOpen {
            inner.success_count += 1;
            if inner.success_count >= self.config.success_threshold {
                inner.state = CircuitState::Closed;
                inner.success_count = 0;
                inner.next_attempt = None;
                tracing::info!(circuit = %self.name, "Circuit breaker closed");
            }
        }
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;
        inner.total_failures += 1;
        inner.failure_count += 1;
        inner.last_failure = Some(Utc::now());

        match inner.state {
            CircuitState::HalfOpen => {
                // A single failed probe reopens the circuit
                self.open(&mut inner, self.config.recovery_timeout);
            }
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                self.open(&mut inner, self.config.recovery_timeout);
            }
            _ => {}
        }
    }

    /// Manually reset the circuit breaker to closed state with zeroed counters
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure = None;
        inner.next_attempt = None;
        tracing::info!(circuit = %self.name, "Circuit breaker reset");
    }

    /// Force the circuit open for a fixed window (e.g. planned maintenance)
    pub fn force_open(&self, duration: Duration) {
        let mut inner = self.inner.lock();
        self.open(&mut inner, duration);
    }

    /// Get circuit breaker statistics
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        let next_attempt_in = match inner.state {
            CircuitState::Open => inner
                .next_attempt
                .map(|deadline| deadline.saturating_duration_since(Instant::now())),
            _ => None,
        };

        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
            total_rejections: inner.total_rejections,
            last_failure_at: inner.last_failure,
            next_attempt_in,
        }
    }

    fn open(&self, inner: &mut BreakerState, duration: Duration) {
        inner.state = CircuitState::Open;
        inner.success_count = 0;
        inner.next_attempt = Some(Instant::now() + duration);

        tracing::warn!(
            circuit = %self.name,
            failures = inner.failure_count,
            retry_in_ms = duration.as_millis() as u64,
            "Circuit breaker opened"
        );
    }
}
