//! Cache configuration.
//!
//! Controls whether responses are cached at all and how long positive and
//! negative outcomes live.

use std::time::Duration;

use axum::http::StatusCode;

const DEFAULT_TTL_SECS: u64 = 600;
const DEFAULT_NEGATIVE_TTL_SECS: u64 = 60;

/// Cache configuration resolved from `cache`, `cache_ttl` and `negative_cache_ttl`.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Master switch; when false the store never answers and never records.
    pub enabled: bool,
    /// Lifetime of `200 OK` outcomes.
    pub ttl: Duration,
    /// Lifetime of every other outcome.
    pub negative_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            negative_ttl: Duration::from_secs(DEFAULT_NEGATIVE_TTL_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl: settings.ttl,
            negative_ttl: settings.negative_ttl,
        }
    }
}

impl CacheConfig {
    /// Pick the TTL class for an origin outcome.
    pub fn ttl_for(&self, status: StatusCode) -> Duration {
        if status == StatusCode::OK {
            self.ttl
        } else {
            self.negative_ttl
        }
    }

    /// Interval between prefetch passes: half the positive TTL, at least one second.
    pub fn prefetch_interval(&self) -> Duration {
        (self.ttl / 2).max(Duration::from_secs(1))
    }
}
