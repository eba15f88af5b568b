use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "vetrina_preview_enable_total",
            Unit::Count,
            "Preview activation attempts, labelled by outcome."
        );
        describe_counter!(
            "vetrina_preview_secret_rotations_total",
            Unit::Count,
            "Preview secrets generated and written to the content backend."
        );
        describe_counter!(
            "vetrina_secret_cache_fetch_total",
            Unit::Count,
            "Preview-pane secret fetches that missed the cache, labelled by outcome."
        );
        describe_counter!(
            "vetrina_cache_l1_hit_total",
            Unit::Count,
            "Total number of L1 response-cache hits."
        );
        describe_counter!(
            "vetrina_cache_l1_miss_total",
            Unit::Count,
            "Total number of L1 response-cache misses."
        );
        describe_counter!(
            "vetrina_cache_l1_evict_total",
            Unit::Count,
            "Total number of L1 response-cache evictions due to capacity."
        );
        describe_histogram!(
            "vetrina_content_fetch_ms",
            Unit::Milliseconds,
            "Content backend query latency in milliseconds."
        );
    });
}
