//! In-memory smart cache
//!
//! A process-local key/value store for fetched payloads with:
//!
//! - **Per-entry TTL**: checked lazily on every read, plus a periodic sweep
//! - **Usage-weighted eviction**: when either the entry or byte ceiling would be
//!   exceeded, the least valuable quarter of entries (by `access_count / recency`)
//!   is dropped before admitting the new one
//! - **Pattern invalidation**: exact key, regex, or whole-table invalidation via the
//!   key convention in [`key`]

pub mod key;
mod smart_cache;
mod types;


pub use key::{CacheKeyBuilder, table_pattern};
pub use smart_cache::SmartCache;
pub use types::{CacheConfig, CacheEntry, CacheStats};
