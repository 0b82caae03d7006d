//! Keel
//!
//! Facade over [`keel_core`]: circuit breaking, TTL caching, timeout and retry
//! execution, and progressive loading for async clients of slow or flaky data
//! services.
//!
//! ```no_run
//! use keel::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo() -> KeelResult<()> {
//! let fetcher = Arc::new(ResilientFetcher::new(
//!     Arc::new(SmartCache::default()),
//!     Arc::new(CircuitBreaker::new("reports")),
//!     Arc::new(TimeoutExecutor::new(TimeoutConfig::new(Duration::from_secs(5)))),
//! ));
//!
//! let loader = ProgressiveLoader::new(LoaderConfig::default());
//! loader.add_loader(LoaderDescriptor::new("summary", 0, move || {
//!     let fetcher = Arc::clone(&fetcher);
//!     async move {
//!         fetcher
//!             .fetch("reports.summary", Some("reports:summary"), None, || async {
//!                 Ok(serde_json::json!({ "total": 42 }))
//!             })
//!             .await
//!     }
//! }))?;
//! let results = loader.load_all().await?;
//! assert!(results.contains_key("summary"));
//! # Ok(())
//! # }
//! ```

pub use keel_core::*;
