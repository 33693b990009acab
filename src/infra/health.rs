//! Periodic origin health probe and cache sweep.

use std::{sync::Arc, time::Duration};

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::{
    cache::{CacheStore, StatusProbe},
    upstream::UpstreamClient,
};

use super::shutdown::Shutdown;

pub struct HealthMonitor {
    upstream: Arc<UpstreamClient>,
    probe: Arc<StatusProbe>,
    cache: Arc<CacheStore>,
}

impl HealthMonitor {
    pub fn new(
        upstream: Arc<UpstreamClient>,
        probe: Arc<StatusProbe>,
        cache: Arc<CacheStore>,
    ) -> Self {
        Self {
            upstream,
            probe,
            cache,
        }
    }

    /// Probe `/status`, record the outcome and sweep expired entries.
    ///
    /// Returns the number of evicted entries; zero while the origin is down.
    pub async fn check(&self) -> usize {
        let healthy = self.upstream.check_status().await;
        self.probe.record(healthy);

        let evicted = self.cache.purge_expired();
        debug!(
            target = "cache_stnsd::health",
            healthy,
            evicted,
            remaining = self.cache.len(),
            "health check completed"
        );
        evicted
    }

    /// Check every `interval` until shutdown. The first check waits one interval.
    pub async fn run(self, interval: Duration, mut shutdown: Shutdown) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    self.check().await;
                }
            }
        }

        info!(target = "cache_stnsd::health", "health monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, num::NonZeroU32};

    use axum::http::StatusCode;
    use bytes::Bytes;
    use httpmock::MockServer;
    use url::Url;

    use super::*;
    use crate::{
        cache::{CacheConfig, CacheEntry, OriginHealth},
        upstream::{RetryPolicy, TlsMaterial, UpstreamConfig},
    };

    fn upstream(endpoint: &str) -> Arc<UpstreamClient> {
        let config = UpstreamConfig {
            endpoint: Url::parse(endpoint).expect("endpoint"),
            auth_token: None,
            user: None,
            password: None,
            headers: BTreeMap::new(),
            http_proxy: None,
            ssl_verify: true,
            keepalive: true,
            tls: TlsMaterial::default(),
            timeout: Duration::from_secs(2),
            retry: RetryPolicy::once(),
        };
        Arc::new(UpstreamClient::new(config).expect("client"))
    }

    fn expired_cache(probe: Arc<StatusProbe>) -> Arc<CacheStore> {
        let cache = Arc::new(CacheStore::new(&CacheConfig::default(), probe));
        cache.put(
            "http://origin/v1/users?name=alice",
            CacheEntry::new(StatusCode::OK, Vec::new(), Bytes::from_static(b"[]")),
            Duration::ZERO,
        );
        cache
    }

    #[tokio::test]
    async fn unhealthy_origin_keeps_expired_entries() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/v1/status");
            then.status(503);
        });

        let probe = Arc::new(StatusProbe::new());
        let cache = expired_cache(probe.clone());
        let monitor = HealthMonitor::new(upstream(&server.url("/v1")), probe.clone(), cache.clone());

        assert_eq!(monitor.check().await, 0);
        assert!(!probe.is_healthy());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn healthy_origin_sweeps_expired_entries() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/v1/status");
            then.status(200);
        });

        let probe = Arc::new(StatusProbe::new());
        probe.record(false);
        let cache = expired_cache(probe.clone());
        let monitor = HealthMonitor::new(upstream(&server.url("/v1")), probe.clone(), cache.clone());

        assert_eq!(monitor.check().await, 1);
        assert!(probe.is_healthy());
        assert!(cache.is_empty());
    }
}
