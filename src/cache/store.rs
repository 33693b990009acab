//! Response cache storage.
//!
//! Entries expire after their TTL unless the origin is unhealthy, in which case
//! eviction is deferred and the stale outcome keeps being served.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::Duration,
};

use axum::http::StatusCode;
use bytes::Bytes;
use metrics::counter;
use tokio::time::Instant;
use tracing::debug;

use super::config::CacheConfig;
use super::liveness::OriginHealth;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

const METRIC_CACHE_HIT: &str = "stnsd_cache_hit_total";
const METRIC_CACHE_MISS: &str = "stnsd_cache_miss_total";
const METRIC_CACHE_STALE: &str = "stnsd_cache_stale_served_total";

/// A cached origin outcome.
///
/// The body is only kept for `200 OK`; every other status is remembered by
/// its code and allow-listed headers alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CacheEntry {
    pub fn new(status: StatusCode, headers: Vec<(String, String)>, body: Bytes) -> Self {
        let body = if status == StatusCode::OK {
            body
        } else {
            Bytes::new()
        };
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StatusCode::OK
    }
}

struct Slot {
    entry: Arc<CacheEntry>,
    expires_at: Instant,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory key → outcome map shared by request handlers and the prefetcher.
pub struct CacheStore {
    enabled: bool,
    entries: RwLock<HashMap<String, Slot>>,
    health: Arc<dyn OriginHealth>,
}

impl CacheStore {
    pub fn new(config: &CacheConfig, health: Arc<dyn OriginHealth>) -> Self {
        Self {
            enabled: config.enabled,
            entries: RwLock::new(HashMap::new()),
            health,
        }
    }

    /// Store `entry` under `key`, replacing any previous outcome.
    pub fn put(&self, key: impl Into<String>, entry: CacheEntry, ttl: Duration) {
        if !self.enabled {
            return;
        }

        let slot = Slot {
            entry: Arc::new(entry),
            expires_at: Instant::now() + ttl,
        };
        rw_write(&self.entries, SOURCE, "put").insert(key.into(), slot);
    }

    /// Look up `key`. Reads never move an entry's expiry.
    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        if !self.enabled {
            return None;
        }

        let now = Instant::now();
        {
            let entries = rw_read(&self.entries, SOURCE, "get");
            match entries.get(key) {
                None => {
                    counter!(METRIC_CACHE_MISS).increment(1);
                    return None;
                }
                Some(slot) if !slot.is_expired(now) => {
                    counter!(METRIC_CACHE_HIT).increment(1);
                    return Some(slot.entry.clone());
                }
                Some(slot) if !self.health.is_healthy() => {
                    debug!(key, "serving expired entry while origin is unhealthy");
                    counter!(METRIC_CACHE_STALE).increment(1);
                    return Some(slot.entry.clone());
                }
                Some(_) => {}
            }
        }

        // Expired with a healthy origin: evict, unless a writer replaced the
        // slot between dropping the read guard and taking the write guard.
        let mut entries = rw_write(&self.entries, SOURCE, "get.evict");
        match entries.get(key) {
            Some(slot) if !slot.is_expired(now) => {
                counter!(METRIC_CACHE_HIT).increment(1);
                Some(slot.entry.clone())
            }
            Some(_) => {
                entries.remove(key);
                counter!(METRIC_CACHE_MISS).increment(1);
                None
            }
            None => {
                counter!(METRIC_CACHE_MISS).increment(1);
                None
            }
        }
    }

    /// Evict every expired entry, unless the origin is unhealthy.
    ///
    /// Returns the number of evicted entries.
    pub fn purge_expired(&self) -> usize {
        if !self.enabled || !self.health.is_healthy() {
            return 0;
        }

        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "purge_expired");
        let before = entries.len();
        entries.retain(|_, slot| !slot.is_expired(now));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
