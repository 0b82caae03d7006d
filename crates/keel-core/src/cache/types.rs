//! Cache types and data structures

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Cache entry containing data and metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cached payload
    pub value: serde_json::Value,
    /// When the entry was created (or last replaced by `set`)
    pub created_at: Instant,
    /// Lifetime measured from `created_at`
    pub ttl: Duration,
    /// Number of reads served from this entry
    pub access_count: u64,
    pub last_accessed: Instant,
    /// Estimated footprint: length of the serialized payload
    pub size: usize,
}

impl CacheEntry {
    /// Create a new cache entry
    pub fn new(value: serde_json::Value, ttl: Duration, now: Instant) -> Self {
        let size = value.to_string().len();
        Self {
            value,
            created_at: now,
            ttl,
            access_count: 0,
            last_accessed: now,
            size,
        }
    }

    /// Check if the entry has outlived its TTL
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }

    /// Mark the entry as accessed
    pub fn mark_accessed(&mut self, now: Instant) {
        self.access_count += 1;
        self.last_accessed = now;
    }

    /// Retention value used by eviction; higher is more valuable
    pub fn score(&self, now: Instant) -> f64 {
        let idle_ms = now.saturating_duration_since(self.last_accessed).as_millis() as f64;
        self.access_count as f64 / (idle_ms + 1.0)
    }
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Ceiling on the aggregate size of all entries, in bytes
    pub max_size: usize,
    /// Ceiling on the number of entries
    pub max_entries: usize,
    /// TTL applied when `set` is called without one
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// Interval of the background expiry sweep
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 50 * 1024 * 1024, // 50MB
            max_entries: 1000,
            default_ttl: Duration::from_secs(300), // 5 minutes
            cleanup_interval: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: usize,
    pub max_entries: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Percentage of lookups served from cache, recomputed on every lookup
    pub hit_rate: f64,
    /// Entries removed to make room
    pub evictions: u64,
    /// Entries removed because their TTL elapsed
    pub expirations: u64,
}
