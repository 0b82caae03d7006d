//! Cache, executor and breaker composed around a fetch

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::source::{DataSource, Query};
use crate::cache::SmartCache;
use crate::error::KeelResult;
use crate::loader::LoaderDescriptor;
use crate::recovery::circuit_breaker::CircuitBreaker;
use crate::recovery::timeout::{ExecuteOptions, TimeoutExecutor, with_timeout};

/// Guards every fetch with a cache, a timeout executor and a circuit breaker
///
/// All three collaborators are shared handles, so several fetchers (or a
/// fetcher and a [`ProgressiveLoader`](crate::loader::ProgressiveLoader)) can
/// work against the same cache and the same breaker for one dependency.
#[derive(Debug, Clone)]
pub struct ResilientFetcher {
    cache: Arc<SmartCache>,
    breaker: Arc<CircuitBreaker>,
    executor: Arc<TimeoutExecutor>,
    options: ExecuteOptions,
}

impl ResilientFetcher {
    /// Create a fetcher that uses the executor's default timeout config
    pub fn new(
        cache: Arc<SmartCache>,
        breaker: Arc<CircuitBreaker>,
        executor: Arc<TimeoutExecutor>,
    ) -> Self {
        let options = ExecuteOptions::new(executor.defaults().clone());
        Self {
            cache,
            breaker,
            executor,
            options,
        }
    }

    /// Replace the timeout config, hooks and cancellation token used per fetch
    pub fn with_options(mut self, options: ExecuteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cache(&self) -> &Arc<SmartCache> {
        &self.cache
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn executor(&self) -> &Arc<TimeoutExecutor> {
        &self.executor
    }

    pub fn options(&self) -> &ExecuteOptions {
        &self.options
    }

    /// Fetch through cache, executor and breaker
    ///
    /// A cache hit returns without calling `operation`. Each executor attempt is
    /// a separate breaker call, and the per-attempt deadline runs inside the
    /// breaker so a timed-out attempt counts as a breaker failure. Only a
    /// successful result is cached.
    pub async fn fetch<T, F, Fut>(
        &self,
        description: &str,
        cache_key: Option<&str>,
        ttl: Option<Duration>,
        operation: F,
    ) -> KeelResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = KeelResult<T>>,
    {
        if let Some(key) = cache_key {
            if let Some(hit) = self.cache.get::<T>(key)? {
                tracing::debug!(operation = %description, key = %key, "Served from cache");
                return Ok(hit);
            }
        }

        let attempt_timeout = self.options.config.timeout;
        let mut options = self.options.clone();
        options.config.timeout = Duration::MAX;

        let breaker = &self.breaker;
        let operation = &operation;
        let outcome = self
            .executor
            .execute_with_timeout(description, &options, || {
                breaker.execute(move || with_timeout(attempt_timeout, operation()))
            })
            .await;
        let value = outcome.into_result()?;

        if let Some(key) = cache_key {
            if let Err(e) = self.cache.set(key, &value, ttl) {
                tracing::warn!(operation = %description, key = %key, error = %e, "Fetched value not cached");
            }
        }
        Ok(value)
    }

    /// Run `query` against `source` through [`ResilientFetcher::fetch`]
    pub async fn query(
        &self,
        source: &dyn DataSource,
        query: &Query,
        ttl: Option<Duration>,
    ) -> KeelResult<serde_json::Value> {
        let description = format!("{}.{}", source.name(), query.table);
        let cache_key = query.cache_key();
        self.fetch(&description, Some(&cache_key), ttl, || source.query(query))
            .await
    }

    /// Turn an operation into a fetch function for a loader descriptor
    ///
    /// Every call of the returned function goes through [`ResilientFetcher::fetch`].
    pub fn loader_fetch<T, F, Fut>(
        self: &Arc<Self>,
        description: impl Into<String>,
        cache_key: Option<String>,
        ttl: Option<Duration>,
        operation: F,
    ) -> impl Fn() -> BoxFuture<'static, KeelResult<T>> + Send + Sync + 'static
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = KeelResult<T>> + Send + 'static,
    {
        let fetcher = Arc::clone(self);
        let operation = Arc::new(operation);
        let description: Arc<str> = description.into().into();
        let cache_key: Option<Arc<str>> = cache_key.map(Into::into);

        move || {
            let fetcher = Arc::clone(&fetcher);
            let operation = Arc::clone(&operation);
            let description = Arc::clone(&description);
            let cache_key = cache_key.clone();
            async move {
                fetcher
                    .fetch(&description, cache_key.as_deref(), ttl, || (*operation)())
                    .await
            }
            .boxed()
        }
    }

    /// Build a loader descriptor that queries `source` through this fetcher
    pub fn loader_descriptor(
        self: &Arc<Self>,
        key: impl Into<String>,
        priority: u32,
        source: Arc<dyn DataSource>,
        query: Query,
        ttl: Option<Duration>,
    ) -> LoaderDescriptor {
        let description = format!("{}.{}", source.name(), query.table);
        let cache_key = query.cache_key();
        let fetch = self.loader_fetch(description, Some(cache_key), ttl, move || {
            let source = Arc::clone(&source);
            let query = query.clone();
            async move { source.query(&query).await }
        });
        LoaderDescriptor::new(key, priority, fetch)
    }
}
