//! Background prefetch of the user and group listings.
//!
//! Each pass fetches the full listing of every collection and seeds the
//! per-record `?name=` and `?id=` lookups, so the first lookup of a record
//! after startup or expiry is already a cache hit.

use std::{sync::Arc, time::Duration};

use axum::http::StatusCode;
use bytes::Bytes;
use futures::future::join_all;
use metrics::counter;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::{
    cache::{CacheEntry, CacheStore},
    domain::{Collection, Record},
    upstream::{UpstreamClient, UpstreamError, UpstreamResponse},
};

use super::shutdown::Shutdown;

const METRIC_PREFETCH_SEEDED: &str = "stnsd_prefetch_seeded_total";

#[derive(Debug, Error)]
pub enum PrefetchError {
    #[error("failed to fetch `{resource}` listing: {source}")]
    Upstream {
        resource: &'static str,
        #[source]
        source: UpstreamError,
    },
    #[error("`{resource}` listing answered with status {status}")]
    Status {
        resource: &'static str,
        status: StatusCode,
    },
    #[error("failed to decode `{resource}` listing: {source}")]
    Decode {
        resource: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode `{resource}` record `{name}`: {source}")]
    Encode {
        resource: &'static str,
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

pub struct Prefetcher {
    upstream: Arc<UpstreamClient>,
    cache: Arc<CacheStore>,
    ttl: Duration,
}

impl Prefetcher {
    pub fn new(upstream: Arc<UpstreamClient>, cache: Arc<CacheStore>, ttl: Duration) -> Self {
        Self {
            upstream,
            cache,
            ttl,
        }
    }

    /// Run one pass over every collection concurrently.
    ///
    /// A failing collection is logged and does not affect the others. Returns
    /// the number of seeded per-record entries.
    pub async fn prefetch_all(&self) -> usize {
        let passes = Collection::ALL
            .into_iter()
            .map(|collection| async move { (collection, self.prefetch(collection).await) });

        let mut seeded = 0;
        for (collection, outcome) in join_all(passes).await {
            match outcome {
                Ok(count) => {
                    debug!(
                        target = "cache_stnsd::prefetch",
                        resource = collection.resource(),
                        seeded = count,
                        "prefetch pass finished"
                    );
                    seeded += count;
                }
                Err(err) => error!(
                    target = "cache_stnsd::prefetch",
                    resource = collection.resource(),
                    error = %err,
                    "prefetch pass failed"
                ),
            }
        }
        seeded
    }

    /// Fetch one listing and seed its per-record entries.
    ///
    /// The origin is always asked directly and the failure lockout is left
    /// alone; request handling owns that state.
    pub async fn prefetch(&self, collection: Collection) -> Result<usize, PrefetchError> {
        let resource = collection.resource();
        let listing_url = self.upstream.request_url(resource, None);

        let UpstreamResponse {
            status,
            headers,
            body,
        } = self
            .upstream
            .fetch(&listing_url)
            .await
            .map_err(|source| PrefetchError::Upstream { resource, source })?;

        if status != StatusCode::OK {
            return Err(PrefetchError::Status { resource, status });
        }

        self.cache.put(
            listing_url.as_str(),
            CacheEntry::new(status, headers.clone(), body.clone()),
            self.ttl,
        );

        let records = collection
            .decode(&body)
            .map_err(|source| PrefetchError::Decode { resource, source })?;

        let mut seeded = 0;
        for record in &records {
            seeded += self.seed(collection, record, &headers)?;
        }

        counter!(METRIC_PREFETCH_SEEDED).increment(seeded as u64);
        Ok(seeded)
    }

    fn seed(
        &self,
        collection: Collection,
        record: &Record,
        headers: &[(String, String)],
    ) -> Result<usize, PrefetchError> {
        let resource = collection.resource();
        let body = record
            .to_lookup_body()
            .map(Bytes::from)
            .map_err(|source| PrefetchError::Encode {
                resource,
                name: record.name().to_string(),
                source,
            })?;

        let queries = [
            format!("name={}", record.name()),
            format!("id={}", record.id()),
        ];
        for query in &queries {
            let key = self.upstream.request_url(resource, Some(query));
            self.cache.put(
                key.as_str(),
                CacheEntry::new(StatusCode::OK, headers.to_vec(), body.clone()),
                self.ttl,
            );
        }
        Ok(queries.len())
    }

    /// Prefetch immediately, then every `interval` until shutdown.
    pub async fn run(self, interval: Duration, mut shutdown: Shutdown) {
        info!(
            target = "cache_stnsd::prefetch",
            interval_secs = interval.as_secs(),
            "prefetcher started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    let seeded = self.prefetch_all().await;
                    info!(
                        target = "cache_stnsd::prefetch",
                        seeded,
                        entries = self.cache.len(),
                        "prefetch completed"
                    );
                }
            }
        }

        info!(target = "cache_stnsd::prefetch", "prefetcher stopped");
    }
}
