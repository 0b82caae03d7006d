//! Smart cache implementation

use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::key::table_pattern;
use super::types::{CacheConfig, CacheEntry, CacheStats};
use crate::error::{KeelError, KeelResult};

/// Floor for the sweep interval; `tokio::time::interval` rejects zero
const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    total_size: usize,
    hits: u64,
    misses: u64,
    hit_rate: f64,
    evictions: u64,
    expirations: u64,
}

impl CacheInner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_size = self.total_size.saturating_sub(entry.size);
        Some(entry)
    }

    fn record_lookup(&mut self, hit: bool) {
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        self.hit_rate = self.hits as f64 / (self.hits + self.misses) as f64 * 100.0;
    }

    /// Drop the lowest-scoring quarter of entries (at least one)
    fn evict_pass(&mut self, now: Instant) -> usize {
        let mut scored: Vec<(f64, Instant, String)> = self
            .entries
            .iter()
            .map(|(key, entry)| (entry.score(now), entry.created_at, key.clone()))
            .collect();
        // Lowest score first; ties go to the oldest entry
        scored.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        let count = (scored.len() / 4).max(1).min(scored.len());
        for (_, _, key) in scored.into_iter().take(count) {
            self.remove(&key);
        }
        self.evictions += count as u64;
        count
    }
}

/// TTL cache with size-bounded, usage-weighted eviction
///
/// Every method takes a short synchronous lock; nothing is held across an
/// `.await`, so one instance can be shared through an `Arc` by every caller.
#[derive(Debug)]
pub struct SmartCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
}

impl SmartCache {
    /// Create a new cache
    pub fn new(config: CacheConfig) -> Self {
        let config = CacheConfig {
            max_entries: config.max_entries.max(1),
            ..config
        };
        Self {
            config,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up the raw payload for `key`
    ///
    /// Expired entries are purged here and reported as a miss.
    pub fn get_value(&self, key: &str) -> Option<serde_json::Value> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.mark_accessed(now);
                let value = entry.value.clone();
                inner.record_lookup(true);
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.remove(key);
            inner.expirations += 1;
            tracing::debug!(key = %key, "Cache entry expired");
        }
        inner.record_lookup(false);
        None
    }

    /// Look up `key` and deserialize it as `T`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> KeelResult<Option<T>> {
        match self.get_value(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Check for a live entry without touching statistics or access counts
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Store `value` under `key` for `ttl` (or the configured default)
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: impl Into<String>,
        value: &T,
        ttl: Option<Duration>,
    ) -> KeelResult<()> {
        let value = serde_json::to_value(value)?;
        self.set_value(key, value, ttl)
    }

    /// Store a raw payload, evicting first if a ceiling would be exceeded
    ///
    /// Fails without touching the cache when the payload alone is larger than
    /// `max_size`.
    pub fn set_value(
        &self,
        key: impl Into<String>,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> KeelResult<()> {
        let key = key.into();
        let now = Instant::now();
        let entry = CacheEntry::new(value, ttl.unwrap_or(self.config.default_ttl), now);

        if entry.size > self.config.max_size {
            tracing::warn!(
                key = %key,
                size = entry.size,
                max_size = self.config.max_size,
                "Cache entry rejected: larger than cache capacity"
            );
            return Err(KeelError::cache(format!(
                "entry '{}' is {} bytes, cache capacity is {} bytes",
                key, entry.size, self.config.max_size
            )));
        }

        let mut inner = self.inner.lock();
        inner.remove(&key);

        while !inner.entries.is_empty()
            && (inner.entries.len() >= self.config.max_entries
                || inner.total_size + entry.size > self.config.max_size)
        {
            let evicted = inner.evict_pass(now);
            tracing::debug!(evicted, remaining = inner.entries.len(), "Evicted cache entries");
        }

        inner.total_size += entry.size;
        inner.entries.insert(key, entry);
        Ok(())
    }

    /// Remove a single key, returning whether it was present
    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Remove every key matching `pattern`, returning how many were removed
    pub fn invalidate_pattern(&self, pattern: &Regex) -> usize {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner
            .entries
            .keys()
            .filter(|key| pattern.is_match(key))
            .cloned()
            .collect();

        for key in &keys {
            inner.remove(key);
        }
        if !keys.is_empty() {
            tracing::debug!(pattern = %pattern, removed = keys.len(), "Invalidated cache entries");
        }
        keys.len()
    }

    /// Compile `pattern` and invalidate every matching key
    pub fn invalidate_matching(&self, pattern: &str) -> KeelResult<usize> {
        let regex = Regex::new(pattern)?;
        Ok(self.invalidate_pattern(&regex))
    }

    /// Invalidate every key built for `table`, including per-user keys
    pub fn invalidate_table(&self, table: &str) -> usize {
        self.invalidate_pattern(&table_pattern(table))
    }

    /// Get-or-populate: returns the cached value or calls `fetch` exactly once
    ///
    /// A failing fetch is returned as-is and nothing is cached. A value too large
    /// to cache is still returned to the caller.
    pub async fn cached_query<T, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        ttl: Option<Duration>,
    ) -> KeelResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = KeelResult<T>>,
    {
        if let Some(hit) = self.get::<T>(key)? {
            return Ok(hit);
        }

        let value = fetch().await?;
        if let Err(e) = self.set(key, &value, ttl) {
            tracing::warn!(key = %key, error = %e, "Fetched value not cached");
        }
        Ok(value)
    }

    /// Remove all expired entries, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.remove(key);
        }
        inner.expirations += expired.len() as u64;
        expired.len()
    }

    /// Sweep expired entries every `cleanup_interval` (at least 1ms)
    ///
    /// Stops when `cancel` fires or the cache is dropped.
    pub fn spawn_cleanup(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.config.cleanup_interval.max(MIN_PERIOD);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(cache) = cache.upgrade() else { break };
                        let removed = cache.cleanup_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "Cache sweep removed expired entries");
                        }
                    }
                }
            }
        })
    }

    /// Remove every entry; hit/miss counters are kept
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.total_size = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            total_size: inner.total_size,
            max_entries: self.config.max_entries,
            max_size: self.config.max_size,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: inner.hit_rate,
            evictions: inner.evictions,
            expirations: inner.expirations,
        }
    }
}

impl Default for SmartCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
