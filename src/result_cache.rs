//! Bounded, time-expiring cache of analysis results.
//!
//! Keys are the canonical JSON text of a request description, so two
//! requests that differ only in object key order share an entry and two
//! different requests never do.

use crate::api::canonical_json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Capacity and lifetime of a [`ResultCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultCacheConfig {
    pub max_entries: usize,
    pub ttl_secs: u64,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl_secs: 3600,
        }
    }
}

struct Entry<V> {
    value: V,
    inserted: Instant,
}

/// Thread-safe key/value store with TTL expiry and oldest-first eviction.
pub struct ResultCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    max_entries: usize,
    ttl: Duration,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(config: ResultCacheConfig) -> Self {
        Self::with_ttl(config.max_entries, Duration::from_secs(config.ttl_secs))
    }

    pub fn with_ttl(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
            ttl,
        }
    }

    /// Cache key of a request description.
    pub fn key(request: &serde_json::Value) -> String {
        canonical_json(request)
    }

    /// The cached value, unless absent or older than the TTL. Expired entries
    /// are removed on the way.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        let expired = match entries.get(key) {
            Some(entry) if entry.inserted.elapsed() <= self.ttl => {
                metrics::counter!("result_cache.lookups.total", "result" => "hit").increment(1);
                tracing::debug!("Result cache hit");
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        let result = if expired {
            entries.remove(key);
            tracing::debug!("Result cache entry expired");
            "expired"
        } else {
            "miss"
        };
        metrics::counter!("result_cache.lookups.total", "result" => result).increment(1);
        None
    }

    /// Store `value`, evicting the oldest entry when a new key would exceed
    /// the capacity.
    pub fn insert(&self, key: String, value: V) {
        if self.max_entries == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap();
        if !entries.contains_key(&key)
            && entries.len() >= self.max_entries
            && let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted)
                .map(|(k, _)| k.clone())
        {
            entries.remove(&oldest);
            tracing::debug!("Result cache full, evicted oldest entry");
        }
        entries.insert(
            key,
            Entry {
                value,
                inserted: Instant::now(),
            },
        );
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted.elapsed() <= self.ttl);
        let removed = before - entries.len();
        tracing::debug!(removed, "Pruned expired result cache entries");
        removed
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
