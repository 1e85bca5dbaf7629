//! Change notices emitted by the item service after every successful mutation.
//!
//! The notifier side never blocks: notices go onto an unbounded channel and the relay
//! consumes them in order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::entities::{ItemId, UserId};

/// Monotonic sequence number of a notice within this process.
pub type Epoch = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Created { item_id: ItemId },
    Updated { item_id: ItemId },
    Deleted { item_id: ItemId },
    Liked { item_id: ItemId, user_id: UserId },
    Unliked { item_id: ItemId, user_id: UserId },
}

impl ChangeKind {
    pub fn item_id(&self) -> ItemId {
        match self {
            ChangeKind::Created { item_id }
            | ChangeKind::Updated { item_id }
            | ChangeKind::Deleted { item_id }
            | ChangeKind::Liked { item_id, .. }
            | ChangeKind::Unliked { item_id, .. } => *item_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChangeNotice {
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: ChangeKind,
    pub timestamp: OffsetDateTime,
}

#[derive(Clone)]
pub struct ChangeNotifier {
    sender: mpsc::UnboundedSender<ChangeNotice>,
    epoch: Arc<AtomicU64>,
}

pub struct ChangeFeed {
    receiver: mpsc::UnboundedReceiver<ChangeNotice>,
}

impl ChangeNotifier {
    /// Create a connected notifier and feed.
    pub fn channel() -> (Self, ChangeFeed) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                epoch: Arc::new(AtomicU64::new(0)),
            },
            ChangeFeed { receiver },
        )
    }

    pub fn publish(&self, kind: ChangeKind) {
        let notice = ChangeNotice {
            id: Uuid::new_v4(),
            epoch: self.epoch.fetch_add(1, Ordering::SeqCst),
            kind,
            timestamp: OffsetDateTime::now_utc(),
        };

        debug!(
            target = "sharelist::notify",
            notice_id = %notice.id,
            notice_epoch = notice.epoch,
            notice_kind = ?notice.kind,
            "change notice published"
        );

        if let Err(err) = self.sender.send(notice) {
            // Only happens once the relay has shut down.
            warn!(
                target = "sharelist::notify",
                notice_kind = ?err.0.kind,
                "change feed closed; notice dropped"
            );
        }
    }
}

impl ChangeFeed {
    pub async fn recv(&mut self) -> Option<ChangeNotice> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChangeNotice> {
        self.receiver.try_recv().ok()
    }
}
