//! Failure lockout gating upstream attempts after an outage.

use std::{sync::Mutex, time::Duration};

use tokio::time::Instant;

use crate::cache::lock::mutex_lock;

const SOURCE: &str = "upstream::lockout";

/// Shared failure state.
///
/// Once tripped, `is_locked` reports true for the configured duration. A
/// rejected request does not extend the window; only another real failure
/// does.
#[derive(Debug)]
pub struct FailureLockout {
    last_failure: Mutex<Option<Instant>>,
    duration: Duration,
}

impl FailureLockout {
    pub fn new(duration: Duration) -> Self {
        Self {
            last_failure: Mutex::new(None),
            duration,
        }
    }

    /// Record an upstream failure at the current instant.
    pub fn trip_failure(&self) {
        *mutex_lock(&self.last_failure, SOURCE, "trip_failure") = Some(Instant::now());
    }

    /// Clear the failure state after a successful upstream call.
    pub fn reset(&self) {
        *mutex_lock(&self.last_failure, SOURCE, "reset") = None;
    }

    pub fn is_locked(&self) -> bool {
        self.remaining().is_some()
    }

    /// Time left before upstream attempts are allowed again.
    pub fn remaining(&self) -> Option<Duration> {
        let last_failure = *mutex_lock(&self.last_failure, SOURCE, "remaining");
        let unlocks_at = last_failure? + self.duration;
        let now = Instant::now();
        (now < unlocks_at).then(|| unlocks_at - now)
    }
}
