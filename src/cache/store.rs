//! Cache storage: the backend trait and the in-process LRU implementation.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;
use tracing::debug;

use super::config::CacheConfig;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache command failed: {0}")]
    Command(String),
}

impl CacheError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn command(err: impl std::fmt::Display) -> Self {
        Self::Command(err.to_string())
    }
}

/// Key-value cache with per-entry expiry holding serialized snapshots.
///
/// A miss is `Ok(None)`; errors mean the backend itself could not answer.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Overwrite the entry at `key`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Short label used in logs and metrics.
    fn backend(&self) -> &'static str;
}

#[derive(Debug, Clone)]
struct CachedEntry {
    value: String,
    expires_at: Instant,
}

impl CachedEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process cache bounded by an LRU.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, CachedEntry>>,
}

impl MemoryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.capacity_non_zero())),
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SnapshotCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        match entries.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(Instant::now()) => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => {}
        }
        entries.pop(key);
        debug!(key, "expired cache entry removed");
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let entry = CachedEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let evicted = mutex_lock(&self.entries, SOURCE, "set").push(key.to_string(), entry);
        if matches!(evicted, Some((ref evicted_key, _)) if evicted_key != key) {
            counter!("sharelist_cache_evict_total").increment(1);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        mutex_lock(&self.entries, SOURCE, "delete").pop(key);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_capacity(capacity: usize) -> MemoryCache {
        MemoryCache::new(&CacheConfig {
            capacity,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let cache = cache_with_capacity(4);
        cache
            .set("items:list", "[]".to_string(), Duration::from_secs(60))
            .await
            .expect("set");

        let value = cache.get("items:list").await.expect("get");
        assert_eq!(value.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn miss_is_none() {
        let cache = cache_with_capacity(4);
        assert!(cache.get("absent").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn set_overwrites_previous_value() {
        let cache = cache_with_capacity(4);
        let ttl = Duration::from_secs(60);
        cache.set("k", "one".to_string(), ttl).await.expect("set");
        cache.set("k", "two".to_string(), ttl).await.expect("set");

        assert_eq!(cache.get("k").await.expect("get").as_deref(), Some("two"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_dropped_on_read() {
        let cache = cache_with_capacity(4);
        cache
            .set("k", "v".to_string(), Duration::from_millis(20))
            .await
            .expect("set");

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(cache.get("k").await.expect("get").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = cache_with_capacity(4);
        cache
            .set("k", "v".to_string(), Duration::from_secs(60))
            .await
            .expect("set");
        cache.delete("k").await.expect("delete");
        cache.delete("k").await.expect("delete twice");

        assert!(cache.get("k").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let cache = cache_with_capacity(1);
        let ttl = Duration::from_secs(60);
        cache.set("a", "1".to_string(), ttl).await.expect("set");
        cache.set("b", "2".to_string(), ttl).await.expect("set");

        assert!(cache.get("a").await.expect("get").is_none());
        assert_eq!(cache.get("b").await.expect("get").as_deref(), Some("2"));
    }
}
