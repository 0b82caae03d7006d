//! Retry delay schedules
//!
//! Delays are pure functions of the attempt number so they can be checked
//! without timers. No jitter is applied; callers that want it add their own.

use std::time::Duration;

/// Growth factor between consecutive retry delays
pub const BACKOFF_MULTIPLIER: f64 = 1.5;

/// Delay before retrying after the given 0-indexed attempt failed
///
/// `base * 1.5^attempt`
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    ExponentialBackoff::from_base(base).delay_for_attempt(attempt)
}

/// Delay schedule between retry attempts
pub trait BackoffStrategy: Send + Sync {
    /// Wait before the attempt following failed attempt `attempt` (0-indexed)
    fn delay_for_attempt(&self, attempt: u32) -> Duration;
}

/// Exponential backoff, optionally capped
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    multiplier: f64,
    max_delay: Option<Duration>,
}

impl ExponentialBackoff {
    /// Exponential backoff starting at `base` with the default 1.5 multiplier
    pub fn from_base(base: Duration) -> Self {
        Self {
            base,
            multiplier: BACKOFF_MULTIPLIER,
            max_delay: None,
        }
    }

    /// Set the multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Upper bound on any single delay
    pub fn capped(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let delay = Duration::try_from_secs_f64(self.base.as_secs_f64() * factor)
            .unwrap_or(Duration::MAX);

        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// The same delay after every failed attempt
#[derive(Debug, Clone)]
pub struct ConstantBackoff {
    delay: Duration,
}

impl ConstantBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffStrategy for ConstantBackoff {
    fn delay_for_attempt(&self, _attempt: u32) -> Duration {
        self.delay
    }
}
