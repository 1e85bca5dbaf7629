//! In-process store implementing the repository traits.
//!
//! Used by `storage.backend = "memory"` and throughout the tests. State lives behind one
//! std mutex that is never held across an await.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{
    CreateItemParams, ItemsRepo, LikesRepo, RepoError, UpdateItemParams,
};
use crate::cache::lock::mutex_lock;
use crate::domain::entities::{ItemId, ItemRecord, UserId};

const SOURCE: &str = "infra::memory";

#[derive(Default)]
struct MemoryState {
    last_id: ItemId,
    items: BTreeMap<ItemId, ItemRecord>,
    likes: HashSet<(ItemId, UserId)>,
}

#[derive(Default)]
pub struct MemoryRepositories {
    state: Mutex<MemoryState>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of like relationships recorded for `item_id`.
    pub fn like_relationships(&self, item_id: ItemId) -> usize {
        mutex_lock(&self.state, SOURCE, "like_relationships")
            .likes
            .iter()
            .filter(|(item, _)| *item == item_id)
            .count()
    }
}

#[async_trait]
impl ItemsRepo for MemoryRepositories {
    async fn create_item(&self, params: CreateItemParams) -> Result<ItemRecord, RepoError> {
        let mut state = mutex_lock(&self.state, SOURCE, "create_item");
        state.last_id += 1;
        let now = OffsetDateTime::now_utc();
        let record = ItemRecord {
            id: state.last_id,
            owner_id: params.owner_id,
            title: params.title,
            completed: params.completed,
            like_count: 0,
            created_at: now,
            updated_at: now,
        };
        state.items.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_item(&self, params: UpdateItemParams) -> Result<ItemRecord, RepoError> {
        let mut state = mutex_lock(&self.state, SOURCE, "update_item");
        let record = state.items.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        record.title = params.title;
        record.completed = params.completed;
        record.updated_at = OffsetDateTime::now_utc();
        Ok(record.clone())
    }

    async fn delete_item(&self, id: ItemId) -> Result<(), RepoError> {
        let mut state = mutex_lock(&self.state, SOURCE, "delete_item");
        state.items.remove(&id).ok_or(RepoError::NotFound)?;
        state.likes.retain(|(item, _)| *item != id);
        Ok(())
    }

    async fn find_item(&self, id: ItemId) -> Result<Option<ItemRecord>, RepoError> {
        Ok(mutex_lock(&self.state, SOURCE, "find_item")
            .items
            .get(&id)
            .cloned())
    }

    async fn list_items(&self) -> Result<Vec<ItemRecord>, RepoError> {
        Ok(mutex_lock(&self.state, SOURCE, "list_items")
            .items
            .values()
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

#[async_trait]
impl LikesRepo for MemoryRepositories {
    async fn has_liked(&self, item_id: ItemId, user_id: UserId) -> Result<bool, RepoError> {
        Ok(mutex_lock(&self.state, SOURCE, "has_liked")
            .likes
            .contains(&(item_id, user_id)))
    }

    async fn add_like(&self, item_id: ItemId, user_id: UserId) -> Result<i64, RepoError> {
        let mut state = mutex_lock(&self.state, SOURCE, "add_like");
        if !state.items.contains_key(&item_id) {
            return Err(RepoError::NotFound);
        }
        if !state.likes.insert((item_id, user_id)) {
            return Err(RepoError::Duplicate {
                constraint: "item_likes_pkey".to_string(),
            });
        }
        let record = state.items.get_mut(&item_id).ok_or(RepoError::NotFound)?;
        record.like_count += 1;
        Ok(record.like_count)
    }

    async fn remove_like(&self, item_id: ItemId, user_id: UserId) -> Result<i64, RepoError> {
        let mut state = mutex_lock(&self.state, SOURCE, "remove_like");
        if !state.likes.remove(&(item_id, user_id)) {
            return Err(RepoError::NotFound);
        }
        let record = state.items.get_mut(&item_id).ok_or(RepoError::NotFound)?;
        record.like_count = (record.like_count - 1).max(0);
        Ok(record.like_count)
    }
}
