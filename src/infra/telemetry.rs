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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "ritual_relay_requests_total",
            Unit::Count,
            "Avatar relay requests by outcome."
        );
        describe_counter!(
            "ritual_profile_fallback_total",
            Unit::Count,
            "Profile lookups that fell back to handle-only data, by reason."
        );
        describe_counter!(
            "ritual_export_total",
            Unit::Count,
            "Card exports by outcome and delivery strategy."
        );
        describe_counter!(
            "ritual_raster_retry_total",
            Unit::Count,
            "Rasterizations retried at reduced density."
        );
        describe_histogram!(
            "ritual_raster_ms",
            Unit::Milliseconds,
            "Card rasterization latency in milliseconds."
        );
    });
}
