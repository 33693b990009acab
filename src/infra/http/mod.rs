//! Unix-socket HTTP front end.
//!
//! Every request goes through one fallback handler: cache lookup, then the
//! failure lockout gate, then the origin.

mod middleware;
mod server;

pub use server::serve;

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, StatusCode, Uri},
    middleware::from_fn,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::warn;

use crate::{
    application::error::HttpError,
    cache::{CacheConfig, CacheEntry, CacheStore},
    upstream::{FailureLockout, UpstreamClient},
};

/// Marks whether a response came from the cache (`1`) or the origin (`0`).
pub const CACHE_HEADER: HeaderName = HeaderName::from_static("stnsd-cache");

const SOURCE: &str = "infra::http::proxy";
const METRIC_UPSTREAM_FAILURE: &str = "stnsd_upstream_failure_total";
const METRIC_LOCKOUT_REJECTED: &str = "stnsd_lockout_rejected_total";

#[derive(Clone)]
pub struct ProxyState {
    pub upstream: Arc<UpstreamClient>,
    pub cache: Arc<CacheStore>,
    pub lockout: Arc<FailureLockout>,
    pub cache_config: CacheConfig,
}

pub fn build_router(state: ProxyState) -> Router {
    Router::new()
        .fallback(proxy)
        .layer(from_fn(middleware::log_responses))
        .with_state(state)
}

async fn proxy(State(state): State<ProxyState>, uri: Uri) -> Response {
    let key = state.upstream.request_url(uri.path(), uri.query());

    if let Some(entry) = state.cache.get(key.as_str()) {
        return replay(&entry, true);
    }

    if let Some(remaining) = state.lockout.remaining() {
        counter!(METRIC_LOCKOUT_REJECTED).increment(1);
        warn!(
            target = "cache_stnsd::lockout",
            url = %key,
            remaining_ms = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
            "upstream locked out after a recent failure; rejecting request"
        );
        return with_cache_marker(
            HttpError::new(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Upstream temporarily unavailable",
                format!("failure lockout active for another {remaining:?}"),
            )
            .into_response(),
            false,
        );
    }

    match state.upstream.fetch(&key).await {
        Ok(response) => {
            state.lockout.reset();
            let entry = response.into_cache_entry();
            let reply = replay(&entry, false);
            let ttl = state.cache_config.ttl_for(entry.status);
            state.cache.put(key.as_str(), entry, ttl);
            reply
        }
        Err(err) => {
            state.lockout.trip_failure();
            counter!(METRIC_UPSTREAM_FAILURE).increment(1);
            with_cache_marker(
                HttpError::from_error(
                    SOURCE,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Upstream request failed",
                    &err,
                )
                .into_response(),
                false,
            )
        }
    }
}

/// Build the reply for a stored or fresh outcome.
///
/// Cached non-success outcomes replay their status only; everything else
/// carries the allow-listed headers, and `200 OK` also carries the body.
fn replay(entry: &CacheEntry, from_cache: bool) -> Response {
    let body = if entry.is_success() {
        Body::from(entry.body.clone())
    } else {
        Body::empty()
    };
    let mut response = Response::new(body);
    *response.status_mut() = entry.status;

    if !from_cache || entry.is_success() {
        let headers = response.headers_mut();
        for (name, value) in &entry.headers {
            let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::from_str(value),
            ) else {
                continue;
            };
            headers.append(name, value);
        }
    }

    with_cache_marker(response, from_cache)
}

fn with_cache_marker(mut response: Response, from_cache: bool) -> Response {
    let value = if from_cache {
        HeaderValue::from_static("1")
    } else {
        HeaderValue::from_static("0")
    };
    response.headers_mut().insert(CACHE_HEADER, value);
    response
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn cached_negative_outcome_replays_status_only() {
        let entry = CacheEntry::new(
            StatusCode::NOT_FOUND,
            vec![("user-highest-id".to_string(), "1000".to_string())],
            Bytes::new(),
        );

        let cached = replay(&entry, true);
        assert_eq!(cached.status(), StatusCode::NOT_FOUND);
        assert_eq!(cached.headers()[CACHE_HEADER], "1");
        assert!(cached.headers().get("user-highest-id").is_none());

        let fresh = replay(&entry, false);
        assert_eq!(fresh.headers()[CACHE_HEADER], "0");
        assert_eq!(fresh.headers()["user-highest-id"], "1000");
    }
}
