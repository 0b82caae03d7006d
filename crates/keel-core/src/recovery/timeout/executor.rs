//! Timeout executor implementation

use dashmap::DashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use super::types::{ExecuteOptions, ExecutionOutcome, OperationStats, TimeoutConfig};
use crate::error::{KeelError, KeelResult};
use crate::recovery::backoff::backoff_delay;

/// Runs async operations with a deadline, bounded retries and cancellation
///
/// Statistics are kept per human-readable description for observability only;
/// they never feed back into scheduling.
#[derive(Debug, Default)]
pub struct TimeoutExecutor {
    defaults: TimeoutConfig,
    stats: DashMap<String, OperationStats>,
}

impl TimeoutExecutor {
    /// Create an executor whose [`TimeoutExecutor::execute`] uses `defaults`
    pub fn new(defaults: TimeoutConfig) -> Self {
        Self {
            defaults,
            stats: DashMap::new(),
        }
    }

    pub fn defaults(&self) -> &TimeoutConfig {
        &self.defaults
    }

    /// Execute with the executor's default config, no hooks and no external cancel
    pub async fn execute<T, F, Fut>(&self, description: &str, operation: F) -> ExecutionOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = KeelResult<T>>,
    {
        let options = ExecuteOptions::new(self.defaults.clone());
        self.execute_with_timeout(description, &options, operation)
            .await
    }

    /// Execute `operation` under `options`
    ///
    /// Runs at most `retries + 1` attempts. Each attempt races the operation against
    /// `timeout`; a lost race yields [`KeelError::Timeout`] and drops the in-flight
    /// future. Aborts and circuit-open rejections end the loop immediately; other
    /// failures wait `retry_delay * 1.5^attempt` before the next attempt.
    pub async fn execute_with_timeout<T, F, Fut>(
        &self,
        description: &str,
        options: &ExecuteOptions,
        mut operation: F,
    ) -> ExecutionOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = KeelResult<T>>,
    {
        let config = &options.config;
        let hooks = &options.hooks;
        // Per-call token: cancelling it never touches the caller's token
        let token = options
            .cancel
            .as_ref()
            .map(CancellationToken::child_token)
            .unwrap_or_default();

        let start = Instant::now();
        let mut attempts: u32 = 0;

        let error = loop {
            if token.is_cancelled() {
                break KeelError::aborted("operation cancelled before attempt");
            }

            attempts += 1;
            let error = match Self::run_attempt(&token, config.timeout, operation()).await {
                Ok(data) => {
                    let elapsed = start.elapsed();
                    tracing::debug!(
                        operation = %description,
                        attempts,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Operation succeeded"
                    );
                    hooks.succeeded(attempts, elapsed);
                    self.record(description, attempts, elapsed, true);
                    return ExecutionOutcome {
                        result: Ok(data),
                        attempts,
                        duration: elapsed,
                    };
                }
                Err(error) => error,
            };

            if error.is_timeout() {
                tracing::debug!(operation = %description, attempt = attempts, "Attempt timed out");
                hooks.timed_out(attempts);
            }

            if !error.is_retryable() || attempts > config.retries {
                break error;
            }

            let delay = backoff_delay(config.retry_delay, attempts - 1);
            tracing::debug!(
                operation = %description,
                attempt = attempts,
                error = %error,
                delay_ms = delay.as_millis() as u64,
                "Retrying operation"
            );
            hooks.retrying(attempts, &error, delay);

            tokio::select! {
                biased;
                _ = token.cancelled() => break KeelError::aborted("operation cancelled during backoff"),
                _ = sleep(delay) => {}
            }
        };

        let elapsed = start.elapsed();
        tracing::warn!(
            operation = %description,
            attempts,
            error = %error,
            "Operation failed"
        );
        hooks.failed(&error, attempts);
        self.record(description, attempts, elapsed, false);

        ExecutionOutcome {
            result: Err(error),
            attempts,
            duration: elapsed,
        }
    }

    async fn run_attempt<T, Fut>(
        token: &CancellationToken,
        timeout: Duration,
        attempt: Fut,
    ) -> KeelResult<T>
    where
        Fut: Future<Output = KeelResult<T>>,
    {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(KeelError::aborted("operation cancelled")),
            result = tokio::time::timeout(timeout, attempt) => match result {
                Ok(result) => result,
                Err(_) => Err(KeelError::timeout(timeout)),
            },
        }
    }

    fn record(&self, description: &str, attempts: u32, duration: Duration, success: bool) {
        self.stats
            .entry(description.to_string())
            .or_default()
            .record(attempts, duration, success);
    }

    /// Statistics for one operation description
    pub fn stats(&self, description: &str) -> Option<OperationStats> {
        self.stats.get(description).map(|s| s.value().clone())
    }

    /// Statistics for every description, sorted by description
    pub fn all_stats(&self) -> Vec<(String, OperationStats)> {
        let mut all: Vec<(String, OperationStats)> = self
            .stats
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn clear_stats(&self) {
        self.stats.clear();
    }
}
