//! Item workflow: validation, persistence, list caching, and like toggling.
//!
//! Every successful mutation follows the same sequence: persist, delete the cached
//! list, publish one change notice. Reads go through the cache and fall back to the
//! store on a miss or on any cache failure.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::like_locks::LikeLocks;
use crate::application::notify::{ChangeKind, ChangeNotifier};
use crate::application::repos::{
    CreateItemParams, ItemsRepo, LikesRepo, RepoError, UpdateItemParams,
};
use crate::cache::{CacheKey, SnapshotCache};
use crate::domain::entities::{ItemId, ItemRecord, LikeOutcome, UserId, ViewerItem};
use crate::domain::error::DomainError;
use crate::domain::items::{ensure_item_id, ensure_user_id, normalize_title};

const TARGET: &str = "sharelist::items";

#[derive(Debug, Error)]
pub enum ItemServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl ItemServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ItemServiceError::Domain(DomainError::NotFound { .. })
                | ItemServiceError::Repo(RepoError::NotFound)
        )
    }
}

#[derive(Debug, Clone)]
pub struct CreateItemCommand {
    pub title: String,
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateItemCommand {
    pub title: String,
    pub completed: bool,
}

struct ListCache {
    backend: Arc<dyn SnapshotCache>,
    ttl: Duration,
}

pub struct ItemService {
    items: Arc<dyn ItemsRepo>,
    likes: Arc<dyn LikesRepo>,
    cache: Option<ListCache>,
    locks: LikeLocks,
    notifier: ChangeNotifier,
    // Bumped on every invalidation. A loader that sees a bump before or during its cache
    // write leaves the key deleted.
    generation: AtomicU64,
}

impl ItemService {
    pub fn new(
        items: Arc<dyn ItemsRepo>,
        likes: Arc<dyn LikesRepo>,
        notifier: ChangeNotifier,
    ) -> Self {
        Self {
            items,
            likes,
            cache: None,
            locks: LikeLocks::new(),
            notifier,
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_cache(mut self, backend: Arc<dyn SnapshotCache>, ttl: Duration) -> Self {
        self.cache = Some(ListCache { backend, ttl });
        self
    }

    pub fn with_cache_opt(self, backend: Option<Arc<dyn SnapshotCache>>, ttl: Duration) -> Self {
        match backend {
            Some(backend) => self.with_cache(backend, ttl),
            None => self,
        }
    }

    pub async fn create(
        &self,
        owner_id: UserId,
        command: CreateItemCommand,
    ) -> Result<ItemRecord, ItemServiceError> {
        ensure_user_id(owner_id)?;
        let title = normalize_title(&command.title)?;

        let record = self
            .items
            .create_item(CreateItemParams {
                owner_id,
                title,
                completed: command.completed,
            })
            .await?;

        self.invalidate_list().await;
        self.notifier.publish(ChangeKind::Created { item_id: record.id });
        info!(
            target = TARGET,
            item_id = record.id,
            owner_id,
            "item created"
        );
        Ok(record)
    }

    /// Replace title and completed; owner and like counter are preserved.
    pub async fn update(
        &self,
        item_id: ItemId,
        command: UpdateItemCommand,
    ) -> Result<ItemRecord, ItemServiceError> {
        ensure_item_id(item_id)?;
        let title = normalize_title(&command.title)?;

        let record = self
            .items
            .update_item(UpdateItemParams {
                id: item_id,
                title,
                completed: command.completed,
            })
            .await?;

        self.invalidate_list().await;
        self.notifier.publish(ChangeKind::Updated { item_id });
        info!(target = TARGET, item_id, "item updated");
        Ok(record)
    }

    pub async fn delete(&self, item_id: ItemId) -> Result<(), ItemServiceError> {
        ensure_item_id(item_id)?;

        {
            // Keeps a delete from interleaving with a like on the same item.
            let _section = self.locks.acquire(item_id).await;
            self.items.delete_item(item_id).await?;
        }

        self.invalidate_list().await;
        self.notifier.publish(ChangeKind::Deleted { item_id });
        info!(target = TARGET, item_id, "item deleted");
        Ok(())
    }

    /// All items with `user_has_liked` computed for `viewer_id`.
    pub async fn list(&self, viewer_id: UserId) -> Result<Vec<ViewerItem>, ItemServiceError> {
        ensure_user_id(viewer_id)?;
        let records = self.load_list().await?;

        let mut items = Vec::with_capacity(records.len());
        for record in records {
            let user_has_liked = {
                let _section = self.locks.acquire(record.id).await;
                self.likes.has_liked(record.id, viewer_id).await?
            };
            items.push(ViewerItem {
                record,
                user_has_liked,
            });
        }
        Ok(items)
    }

    /// Current list straight from the store, without any viewer state.
    pub async fn snapshot(&self) -> Result<Vec<ItemRecord>, ItemServiceError> {
        self.items.list_items().await.map_err(ItemServiceError::from)
    }

    /// Whether `user_id` likes `item_id`, checked inside the item's critical section.
    pub async fn has_liked(
        &self,
        item_id: ItemId,
        user_id: UserId,
    ) -> Result<bool, ItemServiceError> {
        let _section = self.locks.acquire(item_id).await;
        Ok(self.likes.has_liked(item_id, user_id).await?)
    }

    pub async fn like_by_user(
        &self,
        item_id: ItemId,
        user_id: UserId,
    ) -> Result<LikeOutcome, ItemServiceError> {
        ensure_item_id(item_id)?;
        ensure_user_id(user_id)?;

        let outcome = {
            let _section = self.locks.acquire(item_id).await;
            let item = self
                .items
                .find_item(item_id)
                .await?
                .ok_or(RepoError::NotFound)?;

            if self.likes.has_liked(item_id, user_id).await? {
                LikeOutcome {
                    item_id,
                    changed: false,
                    liked: true,
                    like_count: item.like_count,
                }
            } else {
                let like_count = self.likes.add_like(item_id, user_id).await?;
                LikeOutcome {
                    item_id,
                    changed: true,
                    liked: true,
                    like_count,
                }
            }
        };

        if outcome.changed {
            self.invalidate_list().await;
            self.notifier
                .publish(ChangeKind::Liked { item_id, user_id });
            debug!(
                target = TARGET,
                item_id,
                user_id,
                like_count = outcome.like_count,
                "item liked"
            );
        }
        Ok(outcome)
    }

    /// Removing a like that does not exist succeeds without changing anything.
    pub async fn unlike_by_user(
        &self,
        item_id: ItemId,
        user_id: UserId,
    ) -> Result<LikeOutcome, ItemServiceError> {
        ensure_item_id(item_id)?;
        ensure_user_id(user_id)?;

        let outcome = {
            let _section = self.locks.acquire(item_id).await;
            let item = self
                .items
                .find_item(item_id)
                .await?
                .ok_or(RepoError::NotFound)?;

            if self.likes.has_liked(item_id, user_id).await? {
                let like_count = self.likes.remove_like(item_id, user_id).await?;
                LikeOutcome {
                    item_id,
                    changed: true,
                    liked: false,
                    like_count,
                }
            } else {
                LikeOutcome {
                    item_id,
                    changed: false,
                    liked: false,
                    like_count: item.like_count,
                }
            }
        };

        if outcome.changed {
            self.invalidate_list().await;
            self.notifier
                .publish(ChangeKind::Unliked { item_id, user_id });
            debug!(
                target = TARGET,
                item_id,
                user_id,
                like_count = outcome.like_count,
                "item unliked"
            );
        }
        Ok(outcome)
    }

    /// Number of items whose critical section is currently held or awaited.
    pub fn contended_items(&self) -> usize {
        self.locks.len()
    }

    async fn load_list(&self) -> Result<Vec<ItemRecord>, RepoError> {
        let Some(cache) = self.cache.as_ref() else {
            return self.items.list_items().await;
        };

        if let Some(records) = read_cached(cache).await {
            return Ok(records);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let records = self.items.list_items().await?;

        if self.generation.load(Ordering::Acquire) != generation {
            debug!(
                target = TARGET,
                "list changed while loading; skipping cache population"
            );
            return Ok(records);
        }

        write_cached(cache, &records).await;

        // An invalidation that landed while `set` was in flight may have run its delete
        // before our write did.
        if self.generation.load(Ordering::Acquire) != generation {
            debug!(
                target = TARGET,
                "list changed during cache population; dropping written entry"
            );
            delete_cached(cache).await;
        }
        Ok(records)
    }

    async fn invalidate_list(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);

        if let Some(cache) = self.cache.as_ref() {
            delete_cached(cache).await;
        }
    }
}

async fn delete_cached(cache: &ListCache) {
    let key = CacheKey::ItemList.as_str();
    let backend = cache.backend.backend();

    if let Err(err) = cache.backend.delete(key).await {
        counter!("sharelist_cache_error_total", "backend" => backend).increment(1);
        warn!(
            target = TARGET,
            key,
            backend,
            error = %err,
            "cache invalidation failed; entry will expire by ttl"
        );
    }
}

async fn read_cached(cache: &ListCache) -> Option<Vec<ItemRecord>> {
    let key = CacheKey::ItemList.as_str();
    let backend = cache.backend.backend();

    match cache.backend.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str::<Vec<ItemRecord>>(&raw) {
            Ok(records) => {
                counter!("sharelist_cache_hit_total", "backend" => backend).increment(1);
                Some(records)
            }
            Err(err) => {
                counter!("sharelist_cache_miss_total", "backend" => backend).increment(1);
                warn!(
                    target = TARGET,
                    key,
                    backend,
                    error = %err,
                    "discarding undecodable cached list"
                );
                if let Err(err) = cache.backend.delete(key).await {
                    warn!(target = TARGET, key, backend, error = %err, "cache delete failed");
                }
                None
            }
        },
        Ok(None) => {
            counter!("sharelist_cache_miss_total", "backend" => backend).increment(1);
            None
        }
        Err(err) => {
            counter!("sharelist_cache_error_total", "backend" => backend).increment(1);
            warn!(
                target = TARGET,
                key,
                backend,
                error = %err,
                "cache read failed; reading from store"
            );
            None
        }
    }
}

async fn write_cached(cache: &ListCache, records: &[ItemRecord]) {
    let key = CacheKey::ItemList.as_str();
    let backend = cache.backend.backend();

    let raw = match serde_json::to_string(records) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(target = TARGET, key, error = %err, "failed to serialize item list");
            return;
        }
    };

    if let Err(err) = cache.backend.set(key, raw, cache.ttl).await {
        counter!("sharelist_cache_error_total", "backend" => backend).increment(1);
        warn!(
            target = TARGET,
            key,
            backend,
            error = %err,
            "cache write failed"
        );
    }
}
