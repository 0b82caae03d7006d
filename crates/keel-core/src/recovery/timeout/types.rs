//! Timeout executor configuration, hooks and results

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{KeelError, KeelResult};

/// Numeric knobs for a timed, retried execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for each individual attempt
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Extra attempts after the first one (0 means run once)
    pub retries: u32,
    /// Base delay for exponential backoff between attempts
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 0,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl TimeoutConfig {
    /// Create a config with the given per-attempt deadline and no retries
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    /// Set the retry count
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the base backoff delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

type TimeoutHook = Arc<dyn Fn(u32) + Send + Sync>;
type RetryHook = Arc<dyn Fn(u32, &KeelError, Duration) + Send + Sync>;
type SuccessHook = Arc<dyn Fn(u32, Duration) + Send + Sync>;
type FailureHook = Arc<dyn Fn(&KeelError, u32) + Send + Sync>;

/// Observation callbacks; none of them influence control flow
#[derive(Clone, Default)]
pub struct ExecutionHooks {
    on_timeout: Option<TimeoutHook>,
    on_retry: Option<RetryHook>,
    on_success: Option<SuccessHook>,
    on_final_failure: Option<FailureHook>,
}

impl ExecutionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the 1-based attempt number when an attempt hits its deadline
    pub fn on_timeout(mut self, hook: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Arc::new(hook));
        self
    }

    /// Called before waiting to retry: failed attempt, its error, upcoming delay
    pub fn on_retry(
        mut self,
        hook: impl Fn(u32, &KeelError, Duration) + Send + Sync + 'static,
    ) -> Self {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Called with the attempt count and elapsed time on success
    pub fn on_success(mut self, hook: impl Fn(u32, Duration) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    /// Called once with the last error and attempt count when giving up
    pub fn on_final_failure(mut self, hook: impl Fn(&KeelError, u32) + Send + Sync + 'static) -> Self {
        self.on_final_failure = Some(Arc::new(hook));
        self
    }

    pub(crate) fn timed_out(&self, attempt: u32) {
        if let Some(hook) = &self.on_timeout {
            hook(attempt);
        }
    }

    pub(crate) fn retrying(&self, attempt: u32, error: &KeelError, delay: Duration) {
        if let Some(hook) = &self.on_retry {
            hook(attempt, error, delay);
        }
    }

    pub(crate) fn succeeded(&self, attempts: u32, elapsed: Duration) {
        if let Some(hook) = &self.on_success {
            hook(attempts, elapsed);
        }
    }

    pub(crate) fn failed(&self, error: &KeelError, attempts: u32) {
        if let Some(hook) = &self.on_final_failure {
            hook(error, attempts);
        }
    }
}

impl fmt::Debug for ExecutionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionHooks")
            .field("on_timeout", &self.on_timeout.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_final_failure", &self.on_final_failure.is_some())
            .finish()
    }
}

/// Everything one execution needs besides the operation itself
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub config: TimeoutConfig,
    pub hooks: ExecutionHooks,
    /// External cancellation, linked to the per-call token
    pub cancel: Option<CancellationToken>,
}

impl ExecuteOptions {
    pub fn new(config: TimeoutConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn with_hooks(mut self, hooks: ExecutionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Result of a timed, retried execution
#[derive(Debug)]
pub struct ExecutionOutcome<T> {
    /// Terminal value or the last error
    pub result: KeelResult<T>,
    /// Number of times the operation was actually invoked
    pub attempts: u32,
    /// Wall-clock time from start to final outcome
    pub duration: Duration,
}

impl<T> ExecutionOutcome<T> {
    /// Check if the execution succeeded
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Get the success value, if any
    pub fn data(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    /// Get the terminal error, if any
    pub fn error(&self) -> Option<&KeelError> {
        self.result.as_ref().err()
    }

    /// Convert into a plain Result, dropping attempt metadata
    pub fn into_result(self) -> KeelResult<T> {
        self.result
    }
}

/// Rolling statistics for one operation description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    pub total_attempts: u64,
    pub success_count: u64,
    pub failure_count: u64,
    #[serde(with = "humantime_serde")]
    pub average_duration: Duration,
}

impl OperationStats {
    /// Fold one finished execution into the running totals
    pub(crate) fn record(&mut self, attempts: u32, duration: Duration, success: bool) {
        self.total_attempts += u64::from(attempts);
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }

        let executions = self.success_count + self.failure_count;
        let previous = self.average_duration.as_secs_f64() * (executions - 1) as f64;
        self.average_duration =
            Duration::from_secs_f64((previous + duration.as_secs_f64()) / executions as f64);
    }

    /// Total number of executions recorded
    pub fn executions(&self) -> u64 {
        self.success_count + self.failure_count
    }
}
