//! Metric keys emitted along the proxy paths. Kept in its own binary because it
//! installs the global recorder.

mod support;

use std::{collections::HashSet, sync::Arc, time::Duration};

use axum::http::StatusCode;
use bytes::Bytes;
use cache_stnsd::{
    cache::{CacheConfig, CacheEntry, CacheStore, StatusProbe},
    infra::prefetch::Prefetcher,
};
use httpmock::MockServer;
use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;

use support::{Options, get, harness};

#[tokio::test]
async fn proxy_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Hit and miss through the router, then a lockout rejection.
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("GET").path("/v1/users");
        then.status(200).json_body(json!([{"id": 1, "name": "alice"}]));
    });
    let proxy = harness(&server.url("/v1"), Options::default());
    assert_eq!(get(&proxy.router, "/users?name=alice").await.status, StatusCode::OK);
    assert_eq!(get(&proxy.router, "/users?name=alice").await.status, StatusCode::OK);
    proxy.lockout.trip_failure();
    assert_eq!(
        get(&proxy.router, "/users?name=bob").await.status,
        StatusCode::SERVICE_UNAVAILABLE
    );

    // Exhausted retries against a closed port.
    let unreachable = harness(
        "http://127.0.0.1:9/v1",
        Options {
            attempts: 1,
            ..Options::default()
        },
    );
    assert_eq!(
        get(&unreachable.router, "/users?name=alice").await.status,
        StatusCode::INTERNAL_SERVER_ERROR
    );

    // Stale entry served while the origin is down.
    let probe = Arc::new(StatusProbe::new());
    let store = CacheStore::new(&CacheConfig::default(), probe.clone());
    store.put(
        "http://origin/v1/users?id=1",
        CacheEntry::new(StatusCode::OK, Vec::new(), Bytes::from_static(b"[]")),
        Duration::ZERO,
    );
    probe.record(false);
    assert!(store.get("http://origin/v1/users?id=1").is_some());

    // Prefetch seeding.
    let prefetcher = Prefetcher::new(
        proxy.upstream.clone(),
        proxy.cache.clone(),
        Duration::from_secs(600),
    );
    assert!(prefetcher.prefetch_all().await >= 2);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "stnsd_cache_hit_total",
        "stnsd_cache_miss_total",
        "stnsd_cache_stale_served_total",
        "stnsd_upstream_failure_total",
        "stnsd_lockout_rejected_total",
        "stnsd_prefetch_seeded_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
