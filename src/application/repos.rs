//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{ItemId, ItemRecord, UserId};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateItemParams {
    pub owner_id: UserId,
    pub title: String,
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateItemParams {
    pub id: ItemId,
    pub title: String,
    pub completed: bool,
}

#[async_trait]
pub trait ItemsRepo: Send + Sync {
    async fn create_item(&self, params: CreateItemParams) -> Result<ItemRecord, RepoError>;

    /// Replace title and completed. Fails with `NotFound` for unknown ids.
    async fn update_item(&self, params: UpdateItemParams) -> Result<ItemRecord, RepoError>;

    /// Remove an item together with its like relationships.
    async fn delete_item(&self, id: ItemId) -> Result<(), RepoError>;

    async fn find_item(&self, id: ItemId) -> Result<Option<ItemRecord>, RepoError>;

    /// All items ordered by id ascending.
    async fn list_items(&self) -> Result<Vec<ItemRecord>, RepoError>;

    async fn ping(&self) -> Result<(), RepoError>;
}

/// Like relationships and the per-item counter derived from them.
///
/// Implementations keep the relationship write and the counter adjustment atomic with
/// respect to each other. Serializing check-then-write sequences is the caller's job.
#[async_trait]
pub trait LikesRepo: Send + Sync {
    /// `false` for unknown items.
    async fn has_liked(&self, item_id: ItemId, user_id: UserId) -> Result<bool, RepoError>;

    /// Record the relationship and increment the counter, returning the new count.
    ///
    /// Fails with `Duplicate` if the relationship already exists and `NotFound` for
    /// unknown items.
    async fn add_like(&self, item_id: ItemId, user_id: UserId) -> Result<i64, RepoError>;

    /// Remove the relationship and decrement the counter, returning the new count.
    ///
    /// Fails with `NotFound` if there is no such relationship.
    async fn remove_like(&self, item_id: ItemId, user_id: UserId) -> Result<i64, RepoError>;
}
