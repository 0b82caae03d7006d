//! Loader descriptors, session state and configuration

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{KeelError, KeelResult};

/// Type-erased fetch function stored in a descriptor
pub type FetchFn = Arc<dyn Fn() -> BoxFuture<'static, KeelResult<serde_json::Value>> + Send + Sync>;

/// State-change listener: receives the session state and the results so far
pub type Listener = Arc<dyn Fn(&LoadingState, &HashMap<String, serde_json::Value>) + Send + Sync>;

/// A named unit of work for the progressive loader
#[derive(Clone)]
pub struct LoaderDescriptor {
    /// Unique key within the loader
    pub key: String,
    /// Lower runs first; 0 is the critical tier
    pub priority: u32,
    /// Keys that must be completed before this loader may dispatch
    pub dependencies: Vec<String>,
    pub cache_key: Option<String>,
    pub cache_ttl: Option<Duration>,
    /// Schedule one retry after a failure
    pub retry_on_error: bool,
    pub(crate) fetch: FetchFn,
}

impl LoaderDescriptor {
    /// Create a descriptor from a typed async fetch function
    pub fn new<T, F, Fut>(key: impl Into<String>, priority: u32, fetch: F) -> Self
    where
        T: Serialize + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = KeelResult<T>> + Send + 'static,
    {
        let fetch: FetchFn = Arc::new(move || {
            let pending = fetch();
            async move {
                let value = pending.await?;
                Ok::<_, KeelError>(serde_json::to_value(value)?)
            }
            .boxed()
        });
        Self::from_fetch_fn(key, priority, fetch)
    }

    /// Create a descriptor from an already type-erased fetch function
    pub fn from_fetch_fn(key: impl Into<String>, priority: u32, fetch: FetchFn) -> Self {
        Self {
            key: key.into(),
            priority,
            dependencies: Vec::new(),
            cache_key: None,
            cache_ttl: None,
            retry_on_error: false,
            fetch,
        }
    }

    pub fn depends_on(mut self, key: impl Into<String>) -> Self {
        self.dependencies.push(key.into());
        self
    }

    pub fn with_dependencies<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Consult and populate the cache under `cache_key`
    ///
    /// `ttl` of `None` uses the cache's default TTL.
    pub fn with_cache(mut self, cache_key: impl Into<String>, ttl: Option<Duration>) -> Self {
        self.cache_key = Some(cache_key.into());
        self.cache_ttl = ttl;
        self
    }

    pub fn retry_on_error(mut self) -> Self {
        self.retry_on_error = true;
        self
    }

    pub fn is_critical(&self) -> bool {
        self.priority == 0
    }
}

impl fmt::Debug for LoaderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderDescriptor")
            .field("key", &self.key)
            .field("priority", &self.priority)
            .field("dependencies", &self.dependencies)
            .field("cache_key", &self.cache_key)
            .field("cache_ttl", &self.cache_ttl)
            .field("retry_on_error", &self.retry_on_error)
            .finish_non_exhaustive()
    }
}

/// Lifecycle phase of a loading session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingPhase {
    #[default]
    Idle,
    Loading,
    Completed,
    Aborted,
    Errored,
}

impl LoadingPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Errored)
    }
}

impl fmt::Display for LoadingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Observable state of the current (or last) loading session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadingState {
    pub phase: LoadingPhase,
    pub is_loading: bool,
    /// Set only by orchestration errors, never by a failing loader
    pub has_error: bool,
    /// Settled loaders over registered loaders, 0-100
    pub progress: u8,
    pub completed_loaders: BTreeSet<String>,
    pub failed_loaders: BTreeSet<String>,
    pub error: Option<String>,
}

impl LoadingState {
    pub(crate) fn loading() -> Self {
        Self {
            phase: LoadingPhase::Loading,
            is_loading: true,
            ..Default::default()
        }
    }

    pub fn settled(&self) -> usize {
        self.completed_loaders.len() + self.failed_loaders.len()
    }
}

/// Latest state and results, as published on the watch channel
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoaderSnapshot {
    pub state: LoadingState,
    pub results: HashMap<String, serde_json::Value>,
}

/// Loader configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Ceiling on concurrently running fetches within a batch
    pub max_concurrent_queries: usize,
    /// Pause before every non-critical batch
    #[serde(with = "humantime_serde")]
    pub batch_delay: Duration,
    /// Wait before the single retry of a failed loader
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: 3,
            batch_delay: Duration::from_millis(100),
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl LoaderConfig {
    pub fn with_max_concurrent_queries(mut self, max: usize) -> Self {
        self.max_concurrent_queries = max;
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}
