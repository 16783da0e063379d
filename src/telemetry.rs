use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};
use crate::error::AppError;

static METRIC_DESCRIPTIONS: Once = Once::new();

pub const METRIC_CACHE_HIT_TOTAL: &str = "kms_cache_hit_total";
pub const METRIC_CACHE_MISS_TOTAL: &str = "kms_cache_miss_total";
pub const METRIC_CACHE_DELETED_KEYS_TOTAL: &str = "kms_cache_deleted_keys_total";
pub const METRIC_PRIME_WARMED_TOTAL: &str = "kms_cache_prime_warmed_total";
pub const METRIC_PRIME_FAILED_TOTAL: &str = "kms_cache_prime_failed_total";
pub const METRIC_PRIME_RUN_MS: &str = "kms_cache_prime_run_ms";

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), AppError> {
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
            AppError::Telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT_TOTAL,
            Unit::Count,
            "Total number of response-cache hits."
        );
        describe_counter!(
            METRIC_CACHE_MISS_TOTAL,
            Unit::Count,
            "Total number of response-cache misses."
        );
        describe_counter!(
            METRIC_CACHE_DELETED_KEYS_TOTAL,
            Unit::Count,
            "Total number of cache keys deleted during invalidation sweeps."
        );
        describe_counter!(
            METRIC_PRIME_WARMED_TOTAL,
            Unit::Count,
            "Total number of routes warmed by priming runs."
        );
        describe_counter!(
            METRIC_PRIME_FAILED_TOTAL,
            Unit::Count,
            "Total number of routes that failed during priming runs."
        );
        describe_histogram!(
            METRIC_PRIME_RUN_MS,
            Unit::Milliseconds,
            "Priming run duration in milliseconds."
        );
    });
}
