//! Real-time fan-out of list snapshots to connected observers.

mod broadcaster;
mod relay;

pub use broadcaster::{BroadcastHub, HubConfig, ObserverId, Snapshot, Subscription};
pub use relay::{ChangeRelay, encode_snapshot};
