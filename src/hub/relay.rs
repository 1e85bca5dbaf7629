//! Turns change notices into broadcast snapshots.
//!
//! Notices are handled one at a time in publish order, and each one produces exactly
//! one broadcast of the list as the store has it at that moment.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use sharelist_api_types::PushMessage;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::items::ItemService;
use crate::application::notify::ChangeFeed;
use crate::domain::entities::ItemRecord;

use super::broadcaster::{BroadcastHub, Snapshot};

const TARGET: &str = "sharelist::relay";

pub struct ChangeRelay {
    service: Arc<ItemService>,
    hub: BroadcastHub,
    feed: ChangeFeed,
}

impl ChangeRelay {
    pub fn new(service: Arc<ItemService>, hub: BroadcastHub, feed: ChangeFeed) -> Self {
        Self { service, hub, feed }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Prime the hub with the current list, then follow the feed until it closes.
    pub async fn run(mut self) {
        info!(target = TARGET, "change relay started");
        self.publish_current(0).await;

        while let Some(notice) = self.feed.recv().await {
            debug!(
                target = TARGET,
                notice_id = %notice.id,
                notice_epoch = notice.epoch,
                item_id = notice.kind.item_id(),
                "relaying change"
            );
            self.publish_current(notice.epoch + 1).await;
        }
        info!(target = TARGET, "change feed closed; relay stopped");
    }

    async fn publish_current(&self, epoch: u64) {
        let started = Instant::now();
        let records = match self.service.snapshot().await {
            Ok(records) => records,
            Err(err) => {
                // The next notice carries the full list again.
                warn!(target = TARGET, epoch, error = %err, "failed to load list for broadcast");
                return;
            }
        };

        match encode_snapshot(records) {
            Ok(payload) => {
                histogram!("sharelist_relay_snapshot_ms")
                    .record(started.elapsed().as_secs_f64() * 1000.0);
                self.hub.broadcast(Snapshot::new(epoch, payload));
            }
            Err(err) => {
                warn!(target = TARGET, epoch, error = %err, "failed to encode snapshot");
            }
        }
    }
}

/// Encode the viewer-agnostic push message for `records`.
pub fn encode_snapshot(records: Vec<ItemRecord>) -> Result<String, serde_json::Error> {
    let items = records
        .into_iter()
        .map(|record| record.into_wire(false))
        .collect();
    serde_json::to_string(&PushMessage::Items { items })
}
