//! List snapshot cache.
//!
//! The item service keeps one serialized copy of the full item list here. Mutations
//! delete it; the next read repopulates it from the store.
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "memory"   # or "redis"
//! ttl_seconds = 600
//! ```

mod config;
mod keys;
pub(crate) mod lock;
mod redis_backend;
mod store;

pub use config::CacheConfig;
pub use keys::CacheKey;
pub use redis_backend::RedisCache;
pub use store::{CacheError, MemoryCache, SnapshotCache};
