//! Timeout-and-retry execution for async operations
//!
//! [`TimeoutExecutor::execute_with_timeout`] races each attempt against a deadline,
//! retries with exponential backoff and honours cooperative cancellation. It never
//! returns an error directly: every outcome, including cancellation, is carried in
//! the [`ExecutionOutcome`].

mod executor;
mod types;


pub use executor::TimeoutExecutor;
pub use types::{ExecuteOptions, ExecutionHooks, ExecutionOutcome, OperationStats, TimeoutConfig};

use crate::error::{KeelError, KeelResult};
use std::future::Future;
use std::time::Duration;

/// Run a single future against a deadline, without retries or statistics
pub async fn with_timeout<T, Fut>(timeout: Duration, future: Fut) -> KeelResult<T>
where
    Fut: Future<Output = KeelResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(KeelError::timeout(timeout)),
    }
}
