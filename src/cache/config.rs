//! Cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::config::{CacheBackend, CacheSettings};

const DEFAULT_LIST_TTL_SECS: u64 = 600;
const DEFAULT_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When `false`, every read goes straight to the store.
    pub enabled: bool,
    pub backend: CacheBackend,
    pub redis_url: Option<String>,
    /// Lifetime of the cached item list.
    pub list_ttl: Duration,
    /// Maximum entries in the in-process backend.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Memory,
            redis_url: None,
            list_ttl: Duration::from_secs(DEFAULT_LIST_TTL_SECS),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            backend: settings.backend,
            redis_url: settings.redis_url.clone(),
            list_ttl: settings.ttl,
            capacity: settings.capacity.get(),
        }
    }
}

impl CacheConfig {
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
