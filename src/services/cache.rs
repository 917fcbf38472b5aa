use async_trait::async_trait;
use chrono::Utc;
use lru::LruCache;
use serde::{de::DeserializeOwned, Serialize};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::services::metrics;

/// Hit or miss, as reported by `get_with_status`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// Result of a cache read that also reports freshness
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub value: Option<String>,
    pub status: CacheStatus,
    pub ttl_remaining: Option<Duration>,
}

impl CacheLookup {
    pub fn miss() -> Self {
        Self {
            value: None,
            status: CacheStatus::Miss,
            ttl_remaining: None,
        }
    }

    pub fn hit(value: String, ttl_remaining: Option<Duration>) -> Self {
        Self {
            value: Some(value),
            status: CacheStatus::Hit,
            ttl_remaining,
        }
    }
}

/// Key/value store with per-entry expiry.
///
/// Values are serialized JSON strings. Backends never surface errors:
/// a failing read is a miss and a failing write is dropped.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_with_status(&self, key: &str) -> CacheLookup;

    async fn set(&self, key: &str, value: String, ttl: Duration);

    async fn get(&self, key: &str) -> Option<String> {
        self.get_with_status(key).await.value
    }

    /// Drop expired entries, returning how many were removed
    async fn sweep(&self) -> usize {
        0
    }

    /// Number of live entries, when the backend can tell cheaply
    async fn len(&self) -> Option<usize> {
        None
    }

    /// Backend reachability
    async fn ping(&self) -> bool {
        true
    }

    fn backend(&self) -> &'static str;
}

// ============ Memory backend ============

struct MemoryEntry {
    value: String,
    /// Expiry as a unix timestamp in milliseconds
    expires_at: i64,
}

/// In-process LRU cache with lazy eviction on read plus explicit sweeps
pub struct MemoryCache {
    entries: Mutex<LruCache<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get_with_status(&self, key: &str) -> CacheLookup {
        let now = Utc::now().timestamp_millis();
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                let remaining = Duration::from_millis((entry.expires_at - now) as u64);
                return CacheLookup::hit(entry.value.clone(), Some(remaining));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
        }
        CacheLookup::miss()
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        let expires_at = Utc::now().timestamp_millis() + ttl.as_millis() as i64;
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.put(key.to_string(), MemoryEntry { value, expires_at });
    }

    async fn sweep(&self) -> usize {
        let now = Utc::now().timestamp_millis();
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    async fn len(&self) -> Option<usize> {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Some(entries.len())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

// ============ Typed handle ============

/// Shared, cloneable cache handle with typed JSON access
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn memory(max_entries: usize) -> Self {
        Self::new(Arc::new(MemoryCache::new(max_entries)))
    }

    /// Get a key and deserialize; undecodable entries count as misses
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_fresh(key).await.map(|(value, _)| value)
    }

    /// Like `get`, also returning the entry's remaining TTL when known
    pub async fn get_fresh<T: DeserializeOwned>(&self, key: &str) -> Option<(T, Option<Duration>)> {
        let lookup = self.store.get_with_status(key).await;
        let parsed = lookup.value.and_then(|v| match serde_json::from_str(&v) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!(key = key, error = %e, "Discarding undecodable cache entry");
                None
            }
        });
        metrics::record_cache_lookup(key, parsed.is_some());
        parsed.map(|value| (value, lookup.ttl_remaining))
    }

    /// Serialize and store a value with the given TTL
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(serialized) => self.store.set(key, serialized, ttl).await,
            Err(e) => tracing::warn!(key = key, error = %e, "Failed to serialize cache entry"),
        }
    }

    pub async fn sweep(&self) -> usize {
        self.store.sweep().await
    }

    pub async fn len(&self) -> Option<usize> {
        self.store.len().await
    }

    pub async fn ping(&self) -> bool {
        self.store.ping().await
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_hit_reports_remaining_ttl() {
        let cache = MemoryCache::new(16);
        cache
            .set("search:p:naruto", "[]".to_string(), Duration::from_secs(60))
            .await;

        let lookup = cache.get_with_status("search:p:naruto").await;
        assert_eq!(lookup.status, CacheStatus::Hit);
        assert_eq!(lookup.value.as_deref(), Some("[]"));
        let remaining = lookup.ttl_remaining.unwrap();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(50));

        assert_eq!(cache.get_with_status("missing").await.status, CacheStatus::Miss);
    }

    #[tokio::test]
    async fn test_memory_cache_expires_lazily_and_on_sweep() {
        let cache = MemoryCache::new(16);
        cache.set("a", "1".to_string(), Duration::from_millis(10)).await;
        cache.set("b", "2".to_string(), Duration::from_millis(10)).await;
        cache.set("c", "3".to_string(), Duration::from_secs(60)).await;

        tokio::time::sleep(Duration::from_millis(30)).await;

        // Lazy eviction on read
        assert!(cache.get("a").await.is_none());
        assert_eq!(cache.len().await, Some(2));

        // Sweep removes the remaining expired entry
        assert_eq!(cache.sweep().await, 1);
        assert_eq!(cache.len().await, Some(1));
        assert_eq!(cache.get("c").await.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_memory_cache_is_bounded() {
        let cache = MemoryCache::new(2);
        for key in ["a", "b", "c"] {
            cache.set(key, "x".to_string(), Duration::from_secs(60)).await;
        }
        assert_eq!(cache.len().await, Some(2));
        assert!(cache.get("a").await.is_none());
    }

    #[tokio::test]
    async fn test_typed_handle_round_trips_json() {
        let cache = Cache::memory(8);
        cache
            .set("episodes:p:1", &vec![1u32, 2, 3], Duration::from_secs(60))
            .await;

        let value: Option<Vec<u32>> = cache.get("episodes:p:1").await;
        assert_eq!(value, Some(vec![1, 2, 3]));

        let wrong: Option<String> = cache.get("episodes:p:1").await;
        assert!(wrong.is_none());

        let (fresh, remaining) = cache.get_fresh::<Vec<u32>>("episodes:p:1").await.unwrap();
        assert_eq!(fresh, vec![1, 2, 3]);
        assert!(remaining.unwrap() > Duration::from_secs(50));
        assert_eq!(cache.backend(), "memory");
    }
}
