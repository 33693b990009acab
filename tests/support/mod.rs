#![allow(dead_code)]

use std::{collections::BTreeMap, num::NonZeroU32, sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    http::{HeaderMap, Request, StatusCode},
};
use cache_stnsd::{
    cache::{AlwaysHealthy, CacheConfig, CacheStore},
    infra::http::{ProxyState, build_router},
    upstream::{FailureLockout, RetryPolicy, TlsMaterial, UpstreamClient, UpstreamConfig},
};
use tower::ServiceExt;
use url::Url;

pub struct Options {
    pub attempts: u32,
    pub timeout: Duration,
    pub lock: Duration,
    pub cache_enabled: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(2),
            lock: Duration::from_secs(60),
            cache_enabled: true,
        }
    }
}

pub struct Harness {
    pub upstream: Arc<UpstreamClient>,
    pub cache: Arc<CacheStore>,
    pub lockout: Arc<FailureLockout>,
    pub router: Router,
}

pub fn harness(endpoint: &str, options: Options) -> Harness {
    let upstream = Arc::new(
        UpstreamClient::new(UpstreamConfig {
            endpoint: Url::parse(endpoint).expect("endpoint url"),
            auth_token: None,
            user: None,
            password: None,
            headers: BTreeMap::new(),
            http_proxy: None,
            ssl_verify: true,
            keepalive: true,
            tls: TlsMaterial::default(),
            timeout: options.timeout,
            retry: RetryPolicy::new(
                NonZeroU32::new(options.attempts).expect("non-zero attempts"),
                Duration::from_millis(10),
            ),
        })
        .expect("client builds"),
    );

    let cache_config = CacheConfig {
        enabled: options.cache_enabled,
        ..CacheConfig::default()
    };
    let cache = Arc::new(CacheStore::new(&cache_config, Arc::new(AlwaysHealthy)));
    let lockout = Arc::new(FailureLockout::new(options.lock));

    let router = build_router(ProxyState {
        upstream: upstream.clone(),
        cache: cache.clone(),
        lockout: lockout.clone(),
        cache_config,
    });

    Harness {
        upstream,
        cache,
        lockout,
        router,
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn cache_marker(&self) -> &str {
        self.headers
            .get("stnsd-cache")
            .and_then(|value| value.to_str().ok())
            .expect("cache marker present")
    }
}

pub async fn get(router: &Router, uri: &str) -> Reply {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");

    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");

    Reply {
        status,
        headers,
        body,
    }
}
