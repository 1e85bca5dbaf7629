//! Redis-backed snapshot cache, shared between server instances.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info};

use super::store::{CacheError, SnapshotCache};

const POOL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    /// Build a pool for `url`. Connections are opened lazily.
    pub fn connect(url: &str) -> Result<Self, CacheError> {
        let mut config = PoolConfig::from_url(url);
        if let Some(pool) = config.pool.as_mut() {
            pool.timeouts.wait = Some(POOL_TIMEOUT);
            pool.timeouts.create = Some(POOL_TIMEOUT);
            pool.timeouts.recycle = Some(POOL_TIMEOUT);
        }

        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(CacheError::unavailable)?;
        info!(target = "sharelist::cache", "redis cache pool created");

        Ok(Self { pool })
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, CacheError> {
        self.pool.get().await.map_err(CacheError::unavailable)
    }
}

/// PSETEX argument for `ttl`. Redis rejects zero.
fn expiry_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl SnapshotCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(CacheError::command)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let ttl_ms = expiry_millis(ttl);
        conn.pset_ex::<_, _, ()>(key, value, ttl_ms)
            .await
            .map_err(CacheError::command)?;
        debug!(key, ttl_ms, "redis cache entry written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await.map_err(CacheError::command)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_url_is_reported_as_unavailable() {
        let result = RedisCache::connect("not a redis url");
        assert!(matches!(result, Err(CacheError::Unavailable(_))));
    }

    #[test]
    fn expiry_keeps_millisecond_precision() {
        assert_eq!(expiry_millis(Duration::from_millis(1900)), 1900);
        assert_eq!(expiry_millis(Duration::from_millis(250)), 250);
        assert_eq!(expiry_millis(Duration::from_secs(600)), 600_000);
    }

    #[test]
    fn zero_expiry_is_raised_to_one_millisecond() {
        assert_eq!(expiry_millis(Duration::ZERO), 1);
        assert_eq!(expiry_millis(Duration::from_micros(300)), 1);
    }

    #[tokio::test]
    async fn unreachable_server_surfaces_as_error() {
        let cache = RedisCache::connect("redis://127.0.0.1:1/").expect("pool builds lazily");
        let result = cache.get("items:list").await;
        assert!(result.is_err());
    }
}
