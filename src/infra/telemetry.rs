use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "sharelist_cache_hit_total",
            Unit::Count,
            "Item list reads served from the cache."
        );
        describe_counter!(
            "sharelist_cache_miss_total",
            Unit::Count,
            "Item list reads that fell through to the store."
        );
        describe_counter!(
            "sharelist_cache_error_total",
            Unit::Count,
            "Cache backend calls that failed and were bypassed."
        );
        describe_counter!(
            "sharelist_cache_evict_total",
            Unit::Count,
            "In-process cache evictions due to capacity."
        );
        describe_counter!(
            "sharelist_hub_broadcast_total",
            Unit::Count,
            "Snapshots broadcast to observers."
        );
        describe_gauge!(
            "sharelist_hub_observers",
            Unit::Count,
            "Currently registered observers."
        );
        describe_counter!(
            "sharelist_hub_observer_dropped_total",
            Unit::Count,
            "Observers removed because their queue was full or closed."
        );
        describe_histogram!(
            "sharelist_relay_snapshot_ms",
            Unit::Milliseconds,
            "Time to load and encode one broadcast snapshot."
        );
    });
}
