//! Origin liveness used to defer cache expiry during outages.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

/// Answers whether the origin is currently reachable.
///
/// The cache store asks this before evicting an expired entry; while the
/// origin is unhealthy, stale entries keep being served.
pub trait OriginHealth: Send + Sync {
    fn is_healthy(&self) -> bool;
}

/// Liveness that never defers expiry.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysHealthy;

impl OriginHealth for AlwaysHealthy {
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Liveness fed by periodic probes of the origin's status endpoint.
///
/// Starts out healthy so a daemon booted during an outage still expires
/// entries until the first probe reports otherwise.
#[derive(Debug)]
pub struct StatusProbe {
    healthy: AtomicBool,
}

impl StatusProbe {
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
        }
    }

    /// Record a probe outcome, logging transitions.
    pub fn record(&self, healthy: bool) {
        let previous = self.healthy.swap(healthy, Ordering::AcqRel);
        match (previous, healthy) {
            (true, false) => warn!(
                target = "cache_stnsd::health",
                "origin status check failed; expired cache entries will be kept"
            ),
            (false, true) => info!(
                target = "cache_stnsd::health",
                "origin status check recovered; cache expiry resumed"
            ),
            _ => {}
        }
    }
}

impl Default for StatusProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl OriginHealth for StatusProbe {
    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }
}
