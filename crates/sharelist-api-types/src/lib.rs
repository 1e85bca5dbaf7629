//! Wire types shared by the sharelist server and its clients.
//!
//! Everything here is plain serde data: HTTP request bodies, HTTP responses, and the
//! messages pushed to WebSocket subscribers.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// An item as seen by one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub completed: bool,
    pub like_count: i64,
    /// Whether the requesting viewer likes this item. Always `false` in pushed snapshots.
    pub user_has_liked: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemList {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateItemRequest {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateItemRequest {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

/// Result of a like or unlike call.
///
/// `changed` is `false` when the call was a no-op (already liked, or nothing to unlike).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeResponse {
    pub item_id: i64,
    pub liked: bool,
    pub changed: bool,
    pub like_count: i64,
}

/// Messages pushed to WebSocket subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// The full, viewer-agnostic list after a change.
    Items { items: Vec<Item> },
}
