//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use sharelist_api_types::Item;
use time::OffsetDateTime;

pub type ItemId = i64;
pub type UserId = i64;

/// An item as stored, without any viewer-specific state.
///
/// This is also the shape written to the list cache, so it derives `Deserialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    pub owner_id: UserId,
    pub title: String,
    pub completed: bool,
    pub like_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// An item paired with whether one particular viewer likes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerItem {
    pub record: ItemRecord,
    pub user_has_liked: bool,
}

impl ViewerItem {
    pub fn into_wire(self) -> Item {
        self.record.into_wire(self.user_has_liked)
    }
}

impl ItemRecord {
    pub fn into_wire(self, user_has_liked: bool) -> Item {
        Item {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            completed: self.completed,
            like_count: self.like_count,
            user_has_liked,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Result of a like or unlike call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeOutcome {
    pub item_id: ItemId,
    /// Whether the call wrote anything.
    pub changed: bool,
    /// Whether the user likes the item after the call.
    pub liked: bool,
    pub like_count: i64,
}
