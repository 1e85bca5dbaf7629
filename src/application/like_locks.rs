//! Per-item critical sections for like state.
//!
//! Each item id maps to its own async mutex. Entries are created on first use and
//! removed again once nobody holds or waits on them, so the map only ever contains
//! items that are currently contended.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::entities::ItemId;

#[derive(Default)]
pub struct LikeLocks {
    sections: DashMap<ItemId, Arc<Mutex<()>>>,
}

/// Held for the duration of one item's critical section.
pub struct ItemSection<'a> {
    locks: &'a LikeLocks,
    item_id: ItemId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl LikeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `item_id`.
    pub async fn acquire(&self, item_id: ItemId) -> ItemSection<'_> {
        // The shard guard must be gone before awaiting the item mutex.
        let section = self
            .sections
            .entry(item_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = section.lock_owned().await;
        ItemSection {
            locks: self,
            item_id,
            guard: Some(guard),
        }
    }

    /// Number of items that currently have a live section.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

impl ItemSection<'_> {
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }
}

impl Drop for ItemSection<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own reference left: no holder, no waiter.
        self.locks
            .sections
            .remove_if(&self.item_id, |_, section| Arc::strong_count(section) == 1);
    }
}
