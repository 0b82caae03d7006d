//! Deterministic flaky data service used by `keel simulate`

use async_trait::async_trait;
use keel_core::error::{KeelError, KeelResult};
use keel_core::resilient::{DataSource, Query};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// In-process stand-in for a remote records service
///
/// Every `fail_every`-th call fails with a 503-style error; all calls take
/// `latency`. No randomness is involved, so runs are reproducible.
#[derive(Debug)]
pub struct FlakyService {
    name: String,
    latency: Duration,
    fail_every: u32,
    calls: AtomicU32,
    failures: AtomicU32,
}

impl FlakyService {
    pub fn new(name: impl Into<String>, latency: Duration, fail_every: u32) -> Self {
        Self {
            name: name.into(),
            latency,
            fail_every,
            calls: AtomicU32::new(0),
            failures: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for FlakyService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, query: &Query) -> KeelResult<serde_json::Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.latency).await;

        if self.fail_every > 0 && call % self.fail_every == 0 {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(KeelError::operation(format!(
                "503 service unavailable (call {} to {})",
                call, query.table
            )));
        }

        let rows: Vec<_> = (1..=3)
            .map(|id| json!({ "id": id, "table": query.table }))
            .collect();
        Ok(json!({ "table": query.table, "params": query.params, "rows": rows }))
    }
}
