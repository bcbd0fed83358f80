//! Time-boxed memoization of expensive aggregates.
//!
//! A keyed map of `key -> (value, stored_at)`. An entry is served while its
//! age is below the TTL and ignored afterwards; there is no other eviction and
//! no capacity bound, as the keyspace is one entry per aggregate kind.
//!
//! Concurrent misses on the same key are not coalesced: each caller computes
//! and stores its own value, and the last write wins.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::trace;

/// Default time-to-live: one hour.
pub const DEFAULT_TTL_MS: u64 = 3_600_000;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: DateTime<Utc>,
}

/// Process-wide cache of computed aggregates, safe to share between tasks.
#[derive(Debug)]
pub struct MetricsCache<V> {
    ttl_ms: u64,
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> Default for MetricsCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_MS)
    }
}

impl<V: Clone> MetricsCache<V> {
    /// Creates an empty cache with the given TTL in milliseconds.
    #[must_use]
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl_ms,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached value if it is younger than the TTL.
    pub async fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Utc::now()).await
    }

    /// Same as [`get`](Self::get), evaluated at `now`.
    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<V> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        let age_ms = (now - entry.stored_at).num_milliseconds();
        let ttl = i64::try_from(self.ttl_ms).unwrap_or(i64::MAX);
        if age_ms < ttl {
            trace!("Cache hit for {key} (age {age_ms} ms)");
            Some(entry.value.clone())
        } else {
            trace!("Cache entry for {key} expired (age {age_ms} ms)");
            None
        }
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub async fn set(&self, key: &str, value: V) {
        self.set_at(key, value, Utc::now()).await;
    }

    /// Same as [`set`](Self::set), stamped with `now`.
    pub async fn set_at(&self, key: &str, value: V, now: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: now,
            },
        );
    }

    /// Drops the entry for `key`. Returns true if one existed.
    pub async fn invalidate(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
