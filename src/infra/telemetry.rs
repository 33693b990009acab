use std::{
    fs::OpenOptions,
    sync::{Mutex, Once},
};

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    fmt::writer::BoxMakeWriter,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr unless a log file is configured, in which case they are
/// appended to it without ANSI colouring.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let (writer, ansi) = match logging.file.as_deref() {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| {
                    InfraError::telemetry(format!(
                        "failed to open log file `{}`: {err}",
                        path.display()
                    ))
                })?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
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
            "stnsd_cache_hit_total",
            Unit::Count,
            "Total number of lookups answered from a fresh cache entry."
        );
        describe_counter!(
            "stnsd_cache_miss_total",
            Unit::Count,
            "Total number of lookups that found no usable cache entry."
        );
        describe_counter!(
            "stnsd_cache_stale_served_total",
            Unit::Count,
            "Total number of expired entries served while the origin was unhealthy."
        );
        describe_counter!(
            "stnsd_upstream_failure_total",
            Unit::Count,
            "Total number of upstream requests that exhausted their retries."
        );
        describe_counter!(
            "stnsd_lockout_rejected_total",
            Unit::Count,
            "Total number of requests rejected while the failure lockout was active."
        );
        describe_counter!(
            "stnsd_prefetch_seeded_total",
            Unit::Count,
            "Total number of per-record cache entries seeded by the prefetcher."
        );
    });
}
