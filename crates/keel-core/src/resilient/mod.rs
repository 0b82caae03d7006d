//! Composed fetch path
//!
//! [`ResilientFetcher`] puts the pieces in front of a remote call in a fixed
//! order: cache lookup, then the timeout executor (retries, backoff and
//! cancellation), then the circuit breaker, then the fetch itself, with a
//! successful result written back to the cache.

mod fetcher;
mod source;


pub use fetcher::ResilientFetcher;
pub use source::{DataSource, Query};
