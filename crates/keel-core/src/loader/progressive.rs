//! Progressive loader implementation

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::subscription::{ListenerSet, Subscription};
use super::types::{
    Listener, LoaderConfig, LoaderDescriptor, LoaderSnapshot, LoadingPhase, LoadingState,
};
use crate::cache::SmartCache;
use crate::error::{KeelError, KeelResult};
use crate::recovery::backoff::{BackoffStrategy, ConstantBackoff};

type Results = HashMap<String, serde_json::Value>;

/// Descriptors sharing one priority value
struct Batch {
    priority: u32,
    loaders: Vec<Arc<LoaderDescriptor>>,
}

impl Batch {
    fn is_critical(&self) -> bool {
        self.priority == 0
    }
}

/// Group descriptors into ascending-priority batches, keeping registration order
fn plan_batches(descriptors: &[Arc<LoaderDescriptor>]) -> Vec<Batch> {
    let mut sorted = descriptors.to_vec();
    sorted.sort_by_key(|d| d.priority);

    let mut batches: Vec<Batch> = Vec::new();
    for descriptor in sorted {
        match batches.last_mut() {
            Some(batch) if batch.priority == descriptor.priority => batch.loaders.push(descriptor),
            _ => batches.push(Batch {
                priority: descriptor.priority,
                loaders: vec![descriptor],
            }),
        }
    }
    batches
}

fn progress_of(state: &LoadingState, registered: usize) -> u8 {
    if registered == 0 {
        return 100;
    }
    let ratio = state.settled() as f64 / registered as f64;
    (ratio * 100.0).round().min(100.0) as u8
}

struct Session {
    generation: u64,
    cancel: CancellationToken,
    state: LoadingState,
    results: Results,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            generation: 0,
            cancel: CancellationToken::new(),
            state: LoadingState::default(),
            results: Results::new(),
        }
    }
}

struct LoaderInner {
    config: LoaderConfig,
    cache: Option<Arc<SmartCache>>,
    retry_backoff: Box<dyn BackoffStrategy>,
    descriptors: Mutex<Vec<Arc<LoaderDescriptor>>>,
    session: Mutex<Session>,
    listeners: Arc<Mutex<ListenerSet>>,
    snapshot_tx: watch::Sender<LoaderSnapshot>,
    retries: Mutex<Vec<JoinHandle<()>>>,
}

/// Builder for [`ProgressiveLoader`]
pub struct ProgressiveLoaderBuilder {
    config: LoaderConfig,
    cache: Option<Arc<SmartCache>>,
    retry_backoff: Option<Box<dyn BackoffStrategy>>,
}

impl ProgressiveLoaderBuilder {
    /// Consult and populate this cache for descriptors that carry a cache key
    pub fn cache(mut self, cache: Arc<SmartCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replace the fixed `retry_delay` wait before a loader's single retry
    pub fn retry_backoff(mut self, backoff: impl BackoffStrategy + 'static) -> Self {
        self.retry_backoff = Some(Box::new(backoff));
        self
    }

    pub fn build(self) -> ProgressiveLoader {
        let retry_backoff = self
            .retry_backoff
            .unwrap_or_else(|| Box::new(ConstantBackoff::new(self.config.retry_delay)));
        let (snapshot_tx, _) = watch::channel(LoaderSnapshot::default());

        ProgressiveLoader {
            inner: Arc::new(LoaderInner {
                config: self.config,
                cache: self.cache,
                retry_backoff,
                descriptors: Mutex::new(Vec::new()),
                session: Mutex::new(Session::default()),
                listeners: Arc::new(Mutex::new(ListenerSet::default())),
                snapshot_tx,
                retries: Mutex::new(Vec::new()),
            }),
        }
    }
}

/// Priority- and dependency-aware orchestrator for many fetches
///
/// Cloning is cheap and every clone drives the same loader, so one task can run
/// [`ProgressiveLoader::load_all`] while another calls [`ProgressiveLoader::abort`].
#[derive(Clone)]
pub struct ProgressiveLoader {
    inner: Arc<LoaderInner>,
}

impl ProgressiveLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: LoaderConfig) -> ProgressiveLoaderBuilder {
        ProgressiveLoaderBuilder {
            config,
            cache: None,
            retry_backoff: None,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    /// Register a loader for the next session
    pub fn add_loader(&self, descriptor: LoaderDescriptor) -> KeelResult<()> {
        if descriptor.dependencies.iter().any(|dep| *dep == descriptor.key) {
            return Err(KeelError::invalid_input_field(
                format!("loader '{}' depends on itself", descriptor.key),
                "dependencies",
            ));
        }

        let mut descriptors = self.inner.descriptors.lock();
        if descriptors.iter().any(|d| d.key == descriptor.key) {
            return Err(KeelError::invalid_input_field(
                format!("loader '{}' is already registered", descriptor.key),
                "key",
            ));
        }

        tracing::debug!(loader = %descriptor.key, priority = descriptor.priority, "Loader registered");
        descriptors.push(Arc::new(descriptor));
        Ok(())
    }

    /// Keys of all registered loaders, in registration order
    pub fn loader_keys(&self) -> Vec<String> {
        self.inner
            .descriptors
            .lock()
            .iter()
            .map(|d| d.key.clone())
            .collect()
    }

    /// Run every registered loader and return the results by key
    ///
    /// Calling this while a session is loading logs a warning and returns the
    /// current results without starting anything.
    pub async fn load_all(&self) -> KeelResult<Results> {
        let (descriptors, cancel, generation) = {
            let mut session = self.inner.session.lock();
            if session.state.is_loading {
                tracing::warn!("load_all called while a session is already loading");
                return Ok(session.results.clone());
            }

            // Retries still pending from the previous session are dropped
            session.cancel.cancel();
            session.cancel = CancellationToken::new();
            session.generation += 1;
            session.state = LoadingState::loading();
            session.results.clear();

            let descriptors = self.inner.descriptors.lock().clone();
            (descriptors, session.cancel.clone(), session.generation)
        };
        self.notify();

        if let Err(error) = Self::check_dependencies(&descriptors) {
            tracing::error!(error = %error, "Loading session rejected");
            self.finish(generation, LoadingPhase::Errored, Some(&error));
            return Err(error);
        }

        tracing::info!(loaders = descriptors.len(), "Loading session started");
        let registered = descriptors.len();

        'batches: for batch in plan_batches(&descriptors) {
            if cancel.is_cancelled() {
                break;
            }

            if !batch.is_critical() && !self.inner.config.batch_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.inner.config.batch_delay) => {}
                }
            }

            let ready: Vec<Arc<LoaderDescriptor>> = {
                let session = self.inner.session.lock();
                batch
                    .loaders
                    .iter()
                    .filter(|d| {
                        d.dependencies
                            .iter()
                            .all(|dep| session.state.completed_loaders.contains(dep))
                    })
                    .cloned()
                    .collect()
            };

            for skipped in batch.loaders.iter().filter(|d| !ready.iter().any(|r| r.key == d.key)) {
                tracing::debug!(loader = %skipped.key, "Dependencies not met, loader skipped");
            }
            if ready.is_empty() {
                tracing::warn!(priority = batch.priority, "No loader in batch is ready, batch skipped");
                continue;
            }

            // Critical loaders run one at a time
            let chunk_size = if batch.is_critical() {
                1
            } else {
                self.inner.config.max_concurrent_queries.max(1)
            };

            for chunk in ready.chunks(chunk_size) {
                if cancel.is_cancelled() {
                    break 'batches;
                }
                let runs: Vec<_> = chunk
                    .iter()
                    .map(|d| self.run_loader(d, generation, &cancel))
                    .collect();
                futures::future::join_all(runs).await;
            }

            {
                let mut session = self.inner.session.lock();
                if session.generation != generation {
                    break;
                }
                session.state.progress = progress_of(&session.state, registered);
                tracing::debug!(
                    priority = batch.priority,
                    progress = session.state.progress,
                    "Batch settled"
                );
            }
            self.notify();
        }

        self.finish(generation, LoadingPhase::Completed, None);
        Ok(self.results())
    }

    fn check_dependencies(descriptors: &[Arc<LoaderDescriptor>]) -> KeelResult<()> {
        let registered: HashSet<&str> = descriptors.iter().map(|d| d.key.as_str()).collect();
        for descriptor in descriptors {
            if let Some(missing) = descriptor
                .dependencies
                .iter()
                .find(|dep| !registered.contains(dep.as_str()))
            {
                return Err(KeelError::invalid_input_field(
                    format!(
                        "loader '{}' depends on unregistered loader '{}'",
                        descriptor.key, missing
                    ),
                    "dependencies",
                ));
            }
        }
        Ok(())
    }

    /// Move a still-loading session of `generation` into a terminal phase
    fn finish(&self, generation: u64, phase: LoadingPhase, error: Option<&KeelError>) {
        {
            let mut session = self.inner.session.lock();
            if session.generation != generation || session.state.phase != LoadingPhase::Loading {
                return;
            }
            session.state.phase = phase;
            session.state.is_loading = false;
            if let Some(error) = error {
                session.state.has_error = true;
                session.state.error = Some(error.to_string());
            }
            tracing::info!(
                phase = %phase,
                completed = session.state.completed_loaders.len(),
                failed = session.state.failed_loaders.len(),
                "Loading session finished"
            );
        }
        self.notify();
    }

    async fn run_loader(
        &self,
        descriptor: &Arc<LoaderDescriptor>,
        generation: u64,
        cancel: &CancellationToken,
    ) {
        if let Some(value) = self.cached(descriptor) {
            tracing::debug!(loader = %descriptor.key, "Served from cache");
            self.settle(generation, &descriptor.key, Ok(value));
            return;
        }

        tracing::debug!(loader = %descriptor.key, "Dispatching loader");
        let result = (descriptor.fetch)().await;
        let failed = result.is_err();
        if let Ok(value) = &result {
            self.write_through(descriptor, value);
        }
        self.settle(generation, &descriptor.key, result);

        if failed && descriptor.retry_on_error {
            self.schedule_retry(Arc::clone(descriptor), generation, cancel.clone());
        }
    }

    fn cached(&self, descriptor: &LoaderDescriptor) -> Option<serde_json::Value> {
        let cache = self.inner.cache.as_ref()?;
        cache.get_value(descriptor.cache_key.as_deref()?)
    }

    fn write_through(&self, descriptor: &LoaderDescriptor, value: &serde_json::Value) {
        let (Some(cache), Some(key)) = (&self.inner.cache, &descriptor.cache_key) else {
            return;
        };
        if let Err(e) = cache.set_value(key.as_str(), value.clone(), descriptor.cache_ttl) {
            tracing::warn!(loader = %descriptor.key, error = %e, "Result not cached");
        }
    }

    /// Record one loader's outcome in the session of `generation`
    fn settle(&self, generation: u64, key: &str, result: KeelResult<serde_json::Value>) {
        {
            let mut session = self.inner.session.lock();
            if session.generation != generation {
                return;
            }
            match result {
                Ok(value) => {
                    session.results.insert(key.to_string(), value);
                    session.state.failed_loaders.remove(key);
                    session.state.completed_loaders.insert(key.to_string());
                }
                Err(error) => {
                    tracing::warn!(loader = %key, error = %error, "Loader failed");
                    session.state.failed_loaders.insert(key.to_string());
                }
            }
        }
        self.notify();
    }

    fn schedule_retry(
        &self,
        descriptor: Arc<LoaderDescriptor>,
        generation: u64,
        cancel: CancellationToken,
    ) {
        let delay = self.inner.retry_backoff.delay_for_attempt(0);
        let loader = self.clone();
        tracing::debug!(loader = %descriptor.key, delay_ms = delay.as_millis() as u64, "Retry scheduled");

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(loader = %descriptor.key, "Scheduled retry dropped");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match (descriptor.fetch)().await {
                Ok(value) => {
                    tracing::info!(loader = %descriptor.key, "Retry succeeded");
                    loader.write_through(&descriptor, &value);
                    loader.settle(generation, &descriptor.key, Ok(value));
                }
                Err(error) => {
                    tracing::warn!(loader = %descriptor.key, error = %error, "Retry failed");
                }
            }
        });

        let mut retries = self.inner.retries.lock();
        retries.retain(|h| !h.is_finished());
        retries.push(handle);
    }

    /// Wait for every scheduled retry to run or be dropped
    pub async fn settle_retries(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.retries.lock());
            if pending.is_empty() {
                return;
            }
            for result in futures::future::join_all(pending).await {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Retry task did not complete");
                }
            }
        }
    }

    /// Stop dispatching new batches and chunks
    ///
    /// Fetches already in flight run to completion; retries that have not started
    /// are dropped.
    pub fn abort(&self) {
        let aborted = {
            let mut session = self.inner.session.lock();
            session.cancel.cancel();
            if session.state.is_loading {
                session.state.is_loading = false;
                session.state.phase = LoadingPhase::Aborted;
                true
            } else {
                false
            }
        };

        if aborted {
            tracing::info!("Loading session aborted");
            self.notify();
        }
    }

    /// Drop all registered loaders and the current session's results
    pub fn clear(&self) {
        self.inner.descriptors.lock().clear();
        {
            let mut session = self.inner.session.lock();
            session.cancel.cancel();
            let generation = session.generation + 1;
            *session = Session {
                generation,
                ..Session::default()
            };
        }
        self.notify();
    }

    pub fn state(&self) -> LoadingState {
        self.inner.session.lock().state.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.session.lock().state.is_loading
    }

    pub fn results(&self) -> Results {
        self.inner.session.lock().results.clone()
    }

    pub fn get_result(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.session.lock().results.get(key).cloned()
    }

    /// Get a result deserialized as `T`
    pub fn get_result_as<T: DeserializeOwned>(&self, key: &str) -> KeelResult<Option<T>> {
        match self.get_result(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Register a listener called after every state change
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&LoadingState, &Results) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let id = self.inner.listeners.lock().add(listener);
        Subscription {
            id,
            listeners: Arc::downgrade(&self.inner.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Latest-state-wins channel of session snapshots
    ///
    /// Snapshots are published while the session is locked; drop any
    /// `borrow()` guard before calling back into the loader.
    pub fn watch(&self) -> watch::Receiver<LoaderSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    fn notify(&self) {
        // Sent under the session lock so the channel ends on the current state
        let snapshot = {
            let session = self.inner.session.lock();
            let snapshot = LoaderSnapshot {
                state: session.state.clone(),
                results: session.results.clone(),
            };
            self.inner.snapshot_tx.send_replace(snapshot.clone());
            snapshot
        };

        // Listeners run without any loader lock held
        let listeners = self.inner.listeners.lock().snapshot();
        for listener in listeners {
            listener(&snapshot.state, &snapshot.results);
        }
    }
}

impl std::fmt::Debug for ProgressiveLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressiveLoader")
            .field("config", &self.inner.config)
            .field("loaders", &self.loader_keys())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
