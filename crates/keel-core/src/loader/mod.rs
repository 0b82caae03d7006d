//! Progressive data loading
//!
//! Registers named loaders with a priority and dependencies and runs them in
//! tiers: every priority-0 (critical) loader first, one at a time, then each
//! higher priority as a batch after a short pause, at most
//! `max_concurrent_queries` fetches at once. Results flow through the
//! [`SmartCache`](crate::cache::SmartCache) when a descriptor names a cache key.
//!
//! Session state is published to listeners registered with
//! [`ProgressiveLoader::subscribe`] and on a latest-state-wins
//! [`tokio::sync::watch`] channel from [`ProgressiveLoader::watch`].

mod progressive;
mod subscription;
mod types;

#[cfg(test)]
mod tests;

pub use progressive::{ProgressiveLoader, ProgressiveLoaderBuilder};
pub use subscription::Subscription;
pub use types::{
    FetchFn, Listener, LoaderConfig, LoaderDescriptor, LoaderSnapshot, LoadingPhase, LoadingState,
};
