use super::{NetworkFetcher, NetworkFetcherOptions, StatsFetcher, UrlAsyncFetcher, PRODUCT_TOKEN};
use crate::fetch::{CollectedResponse, StringAsyncFetch};
use crate::http::{names, status, RequestContext, RequestHeaders};
use crate::metrics::{names as stat, Statistics};
use crate::scheduler::{MockTimer, SystemTimer};
use crate::support::origin::{gzip_body, OriginServer, ETAG, PLAIN_BODY, SLOW_DELAY};
use crate::support::request_with;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

fn fetcher(options: NetworkFetcherOptions, stats: &Statistics) -> NetworkFetcher {
    NetworkFetcher::new(options, stats, Arc::new(SystemTimer::new()), Handle::current())
        .expect("network fetcher")
}

async fn fetch(f: &NetworkFetcher, url: &str, request: RequestHeaders) -> CollectedResponse {
    let (collect, rx) = StringAsyncFetch::new(RequestContext::new());
    f.fetch(url, collect.with_request_headers(request).into_sink());
    tokio::time::timeout(Duration::from_secs(10), rx)
        .await
        .expect("fetch finished in time")
        .expect("sink completed")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_plain_fetch() {
    let origin = OriginServer::start().await;
    let stats = Statistics::new();
    let f = fetcher(NetworkFetcherOptions::default(), &stats);

    let resp = fetch(&f, &origin.url("/plain"), RequestHeaders::new()).await;
    assert!(resp.success);
    assert_eq!(resp.status(), status::OK);
    assert_eq!(resp.body_str(), PLAIN_BODY);
    assert_eq!(
        resp.response_headers.lookup1(names::CACHE_CONTROL),
        Some("max-age=600")
    );
    assert_eq!(
        resp.extra_response_headers.lookup1(names::X_ORIGINAL_CONTENT_LENGTH),
        Some(PLAIN_BODY.len().to_string().as_str())
    );
    assert_eq!(
        resp.extra_response_headers.lookup1(names::X_PAGE_SPEED),
        Some(PRODUCT_TOKEN)
    );
    assert_eq!(stats.get(stat::SERF_FETCH_REQUEST_COUNT), 1);
    assert_eq!(stats.get(stat::SERF_FETCH_BYTES_COUNT), PLAIN_BODY.len() as i64);
    assert_eq!(stats.get(stat::SERF_FETCH_ACTIVE_COUNT), 0);
    assert_eq!(origin.counters().get("/plain"), 1);
    origin.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_gzip_inflated_for_caller_without_gzip() {
    let origin = OriginServer::start().await;
    let stats = Statistics::new();
    let f = fetcher(
        NetworkFetcherOptions {
            fetch_with_gzip: true,
            ..NetworkFetcherOptions::default()
        },
        &stats,
    );

    let resp = fetch(&f, &origin.url("/gzip"), RequestHeaders::new()).await;
    assert!(resp.success);
    assert_eq!(resp.body_str(), gzip_body());
    assert!(!resp.response_headers.is_gzipped());
    // Stats count what came over the wire.
    let wire = stats.get(stat::SERF_FETCH_BYTES_COUNT);
    assert!(wire > 0 && wire < gzip_body().len() as i64);
    origin.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stats_layer_counts_wire_bytes_of_gzip() {
    let origin = OriginServer::start().await;
    let stats = Statistics::new();
    let network = Arc::new(fetcher(
        NetworkFetcherOptions {
            fetch_with_gzip: true,
            ..NetworkFetcherOptions::default()
        },
        &stats,
    ));
    let counted = StatsFetcher::new("http", network, Arc::new(SystemTimer::new()), &stats);

    let (collect, rx) = StringAsyncFetch::new(RequestContext::new());
    counted.fetch(&origin.url("/gzip"), collect.into_sink());
    let resp = tokio::time::timeout(Duration::from_secs(10), rx)
        .await
        .expect("fetch finished in time")
        .expect("sink completed");

    assert!(resp.success);
    assert_eq!(resp.body_str(), gzip_body());
    assert!(!resp.response_headers.is_gzipped());
    let wire = stats.get(stat::SERF_FETCH_BYTES_COUNT);
    assert!(wire > 0 && wire < gzip_body().len() as i64);
    assert_eq!(stats.get(&format!("http{}", stat::BYTES_FETCHED_SUFFIX)), wire);
    origin.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_gzip_passed_through_when_caller_asked() {
    let origin = OriginServer::start().await;
    let stats = Statistics::new();
    let f = fetcher(NetworkFetcherOptions::default(), &stats);

    let resp = fetch(
        &f,
        &origin.url("/gzip"),
        request_with(&[(names::ACCEPT_ENCODING, "gzip")]),
    )
    .await;
    assert!(resp.success);
    assert!(resp.response_headers.is_gzipped());
    assert_ne!(resp.body, gzip_body().into_bytes());
    origin.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_slow_origin_times_out() {
    let origin = OriginServer::start().await;
    let stats = Statistics::new();
    let f = fetcher(
        NetworkFetcherOptions {
            timeout_ms: 200,
            ..NetworkFetcherOptions::default()
        },
        &stats,
    );

    let started = Instant::now();
    let resp = fetch(&f, &origin.url("/slow"), RequestHeaders::new()).await;
    assert!(!resp.success);
    assert!(started.elapsed() < SLOW_DELAY);
    assert_eq!(stats.get(stat::SERF_FETCH_TIMEOUT_COUNT), 1);
    assert_eq!(stats.get(stat::SERF_FETCH_FAILURE_COUNT), 1);
    assert!(resp.context.log_record().contains("Fetch failed"));
    assert!(f.outstanding_urls().is_empty());
    origin.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_not_modified_and_server_error_pass_through() {
    let origin = OriginServer::start().await;
    let stats = Statistics::new();
    let f = fetcher(NetworkFetcherOptions::default(), &stats);

    let resp = fetch(
        &f,
        &origin.url("/etag"),
        request_with(&[(names::IF_NONE_MATCH, ETAG)]),
    )
    .await;
    assert!(resp.success);
    assert_eq!(resp.status(), status::NOT_MODIFIED);
    assert!(resp.body.is_empty());

    let resp = fetch(&f, &origin.url("/error"), RequestHeaders::new()).await;
    assert!(resp.success);
    assert_eq!(resp.status(), status::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.body_str(), "boom");
    assert_eq!(stats.get(stat::SERF_FETCH_FAILURE_COUNT), 0);
    origin.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_url_fails_without_contact() {
    let stats = Statistics::new();
    let f = fetcher(NetworkFetcherOptions::default(), &stats);

    let resp = fetch(&f, "not a url", RequestHeaders::new()).await;
    assert!(!resp.success);
    assert_eq!(resp.status(), status::NOT_FOUND);
    assert!(resp.context.log_record().contains("Invalid URL"));
    assert_eq!(stats.get(stat::SERF_FETCH_REQUEST_COUNT), 0);
    assert_eq!(f.active_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_https_refused_when_disabled() {
    let stats = Statistics::new();
    let f = fetcher(NetworkFetcherOptions::default(), &stats);
    assert!(!f.supports_https());

    let resp = fetch(&f, "https://www.example.com/", RequestHeaders::new()).await;
    assert!(!resp.success);
    assert_eq!(resp.status(), status::NOT_FOUND);
    assert!(resp.context.log_record().contains("HTTPS fetching has not been enabled"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_outgoing_headers() {
    let origin = OriginServer::start().await;
    let stats = Statistics::new();
    let f = fetcher(NetworkFetcherOptions::default(), &stats);

    let resp = fetch(
        &f,
        &origin.url("/echo-headers"),
        request_with(&[
            (names::USER_AGENT, "test-agent"),
            (names::CONNECTION, "close"),
            ("X-Custom", "yes"),
        ]),
    )
    .await;
    let echoed = resp.body_str();
    assert!(
        echoed.contains(&format!("user-agent: test-agent {PRODUCT_TOKEN}")),
        "{echoed}"
    );
    assert!(echoed.contains("x-custom: yes"), "{echoed}");
    assert!(echoed.contains(&format!("host: {}", origin.addr())), "{echoed}");
    assert!(!echoed.contains("connection: close"), "{echoed}");
    origin.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_cancels_in_flight() {
    let origin = OriginServer::start().await;
    let stats = Statistics::new();
    let f = fetcher(NetworkFetcherOptions::default(), &stats);

    let (slow, rx) = StringAsyncFetch::new(RequestContext::new());
    f.fetch(&origin.url("/slow"), slow.into_sink());
    while f.active_count() == 0 {
        tokio::task::yield_now().await;
    }
    f.shut_down();
    let resp = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("cancelled promptly")
        .expect("sink completed");
    assert!(!resp.success);
    assert_eq!(stats.get(stat::SERF_FETCH_CANCEL_COUNT), 1);

    // Nothing starts after shutdown.
    let late = fetch(&f, &origin.url("/plain"), RequestHeaders::new()).await;
    assert!(!late.success);
    assert_eq!(origin.counters().get("/plain"), 0);
    origin.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_departed_client_cancels_fetch() {
    let origin = OriginServer::start().await;
    let stats = Statistics::new();
    let f = fetcher(NetworkFetcherOptions::default(), &stats);

    let (collect, rx) = StringAsyncFetch::new(RequestContext::new());
    let gone = collect.with_alive_flag(Arc::new(AtomicBool::new(false)));
    f.fetch(&origin.url("/plain"), gone.into_sink());
    let resp = tokio::time::timeout(Duration::from_secs(10), rx)
        .await
        .expect("fetch finished in time")
        .expect("sink completed");

    assert!(!resp.success);
    assert_eq!(stats.get(stat::SERF_FETCH_CANCEL_COUNT), 1);
    assert_eq!(stats.get(stat::SERF_FETCH_FAILURE_COUNT), 0);
    assert_eq!(stats.get(stat::SERF_FETCH_REQUEST_COUNT), 0);
    assert!(f.outstanding_urls().is_empty());
    origin.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_success_ratio_window_resets_after_period() {
    let origin = OriginServer::start().await;
    let stats = Statistics::new();
    let timer = Arc::new(MockTimer::new(MockTimer::APR_5_2010_MS));
    let f = NetworkFetcher::new(
        NetworkFetcherOptions {
            success_check_period_ms: 1000,
            ..NetworkFetcherOptions::default()
        },
        &stats,
        timer.clone(),
        Handle::current(),
    )
    .expect("network fetcher");
    let refused = "http://127.0.0.1:1/down";

    for _ in 0..3 {
        assert!(fetch(&f, &origin.url("/plain"), RequestHeaders::new()).await.success);
        assert!(!fetch(&f, refused, RequestHeaders::new()).await.success);
    }
    // Enough fetches, but the period has not elapsed yet.
    assert_eq!(stats.get(stat::SERF_FETCH_ULTIMATE_SUCCESS), 3);
    assert_eq!(stats.get(stat::SERF_FETCH_ULTIMATE_FAILURE), 3);
    assert_eq!(
        stats.get(stat::SERF_FETCH_LAST_CHECK_TIMESTAMP_MS),
        MockTimer::APR_5_2010_MS
    );

    timer.advance_ms(1001);
    assert!(!fetch(&f, refused, RequestHeaders::new()).await.success);
    assert_eq!(stats.get(stat::SERF_FETCH_ULTIMATE_SUCCESS), 0);
    assert_eq!(stats.get(stat::SERF_FETCH_ULTIMATE_FAILURE), 0);
    assert_eq!(
        stats.get(stat::SERF_FETCH_LAST_CHECK_TIMESTAMP_MS),
        MockTimer::APR_5_2010_MS + 1001
    );
    origin.close().await;
}
