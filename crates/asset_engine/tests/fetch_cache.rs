use std::sync::Arc;
use std::time::Duration;

use asset_engine::{
    CacheSettings, Clock, CrawlSettings, FailureKind, FetchCache, FetchOptions, ManualClock,
    RateLimiter, ReqwestTransport, RespectfulCrawler, TokioClock, TransportSettings,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cache_with(clock: Arc<dyn Clock>, ttl: Duration) -> Arc<FetchCache> {
    bounded_cache(clock, ttl, 16)
}

fn bounded_cache(clock: Arc<dyn Clock>, ttl: Duration, max_entries: usize) -> Arc<FetchCache> {
    let transport = ReqwestTransport::new(TransportSettings::default()).unwrap();
    let limiter = Arc::new(RateLimiter::new(Duration::ZERO, clock.clone()));
    Arc::new(FetchCache::new(
        Arc::new(transport),
        limiter,
        clock,
        CacheSettings { ttl, max_entries },
    ))
}

fn crawler_with(clock: Arc<ManualClock>, settings: CrawlSettings) -> RespectfulCrawler {
    let cache = cache_with(clock.clone(), Duration::from_secs(60));
    RespectfulCrawler::new(cache, clock, settings)
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html; charset=utf-8")
}

#[tokio::test]
async fn second_fetch_within_ttl_is_served_from_cache() {
    harvest_logging::initialize_for_tests();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html("<html>ok</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_with(Arc::new(TokioClock), Duration::from_secs(60));
    let url = format!("{}/page", server.uri());
    let first = cache.fetch(&url, &FetchOptions::default()).await.unwrap();
    let second = cache
        .fetch(&format!("{url}?utm_source=newsletter"), &FetchOptions::default())
        .await
        .unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.body, second.body);
    assert_eq!(cache.network_calls(), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn concurrent_fetches_of_one_url_share_a_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("<html>slow</html>").set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_with(Arc::new(TokioClock), Duration::from_secs(60));
    let url = format!("{}/slow", server.uri());
    let options = FetchOptions::default();
    let (a, b) = tokio::join!(cache.fetch(&url, &options), cache.fetch(&url, &options));

    let served_from_cache = [a.unwrap().from_cache, b.unwrap().from_cache];
    assert_eq!(served_from_cache.iter().filter(|hit| **hit).count(), 1);
    assert_eq!(cache.network_calls(), 1);
    assert_eq!(cache.in_flight(), 0);
}

#[tokio::test]
async fn concurrent_fetches_share_an_error_response_too() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_with(Arc::new(TokioClock), Duration::from_secs(60));
    let url = format!("{}/down", server.uri());
    let options = FetchOptions::default();
    let (a, b) = tokio::join!(cache.fetch(&url, &options), cache.fetch(&url, &options));

    assert_eq!((a.unwrap().status, b.unwrap().status), (503, 503));
    assert_eq!(cache.network_calls(), 1);
    assert!(cache.is_empty());
    assert_eq!(cache.in_flight(), 0);
}

#[tokio::test]
async fn concurrent_crawls_of_one_url_share_their_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/overloaded"))
        .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(50)))
        .expect(2)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let crawler = crawler_with(
        clock.clone(),
        CrawlSettings {
            max_attempts: 2,
            ..CrawlSettings::default()
        },
    );
    let url = format!("{}/overloaded", server.uri());
    let (a, b) = tokio::join!(crawler.fetch(&url), crawler.fetch(&url));

    assert_eq!(a.unwrap_err().kind, FailureKind::HttpStatus(503));
    assert_eq!(b.unwrap_err().kind, FailureKind::HttpStatus(503));
    assert_eq!(crawler.cache().network_calls(), 2);
    assert_eq!(clock.sleeps().len(), 1);
}

#[tokio::test]
async fn oldest_entry_is_evicted_past_the_size_bound() {
    let server = MockServer::start().await;
    for (route, calls) in [("/1", 2u64), ("/2", 1), ("/3", 1)] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(html("<html></html>"))
            .expect(calls)
            .mount(&server)
            .await;
    }

    let clock = Arc::new(ManualClock::new());
    let cache = bounded_cache(clock.clone(), Duration::from_secs(60), 2);
    let options = FetchOptions::default();
    for route in ["/1", "/2", "/3"] {
        cache
            .fetch(&format!("{}{route}", server.uri()), &options)
            .await
            .unwrap();
        clock.advance(Duration::from_secs(1));
    }
    assert_eq!(cache.len(), 2);

    let second = cache
        .fetch(&format!("{}/2", server.uri()), &options)
        .await
        .unwrap();
    assert!(second.from_cache);
    let first = cache
        .fetch(&format!("{}/1", server.uri()), &options)
        .await
        .unwrap();
    assert!(!first.from_cache);
    assert_eq!(cache.network_calls(), 4);
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn purge_empties_the_cache_and_leaves_no_fetch_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("<html></html>"))
        .mount(&server)
        .await;

    let cache = cache_with(Arc::new(TokioClock), Duration::from_secs(60));
    for i in 0..20 {
        cache
            .fetch(&format!("{}/page/{i}", server.uri()), &FetchOptions::default())
            .await
            .unwrap();
    }
    assert_eq!(cache.len(), 16);
    assert_eq!(cache.in_flight(), 0);

    cache.purge();
    assert!(cache.is_empty());
    cache
        .fetch(&format!("{}/page/0", server.uri()), &FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(cache.network_calls(), 21);
}

#[tokio::test]
async fn stale_entry_with_etag_is_revalidated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rules"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rules"))
        .respond_with(
            html("<html>v1</html>")
                .insert_header("etag", "\"v1\"")
                .insert_header("cache-control", "public, max-age=10"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let cache = cache_with(clock.clone(), Duration::from_secs(60));
    let url = format!("{}/rules", server.uri());

    cache.fetch(&url, &FetchOptions::default()).await.unwrap();
    clock.advance(Duration::from_secs(11));
    let revalidated = cache.fetch(&url, &FetchOptions::default()).await.unwrap();
    assert!(revalidated.from_cache);
    assert_eq!(revalidated.body.as_ref(), b"<html>v1</html>");

    // The 304 renewed the entry.
    let fresh = cache.fetch(&url, &FetchOptions::default()).await.unwrap();
    assert!(fresh.from_cache);
    assert_eq!(cache.network_calls(), 2);
}

#[tokio::test]
async fn expired_entry_without_validators_is_fetched_again() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(html("<html>plain</html>"))
        .expect(2)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let cache = cache_with(clock.clone(), Duration::from_secs(60));
    let url = format!("{}/plain", server.uri());

    cache.fetch(&url, &FetchOptions::default()).await.unwrap();
    clock.advance(Duration::from_secs(61));
    let refetched = cache.fetch(&url, &FetchOptions::default()).await.unwrap();
    assert!(!refetched.from_cache);
    assert_eq!(cache.network_calls(), 2);
}

#[tokio::test]
async fn no_store_responses_are_not_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(html("<html>x</html>").insert_header("cache-control", "no-store"))
        .expect(2)
        .mount(&server)
        .await;

    let cache = cache_with(Arc::new(TokioClock), Duration::from_secs(60));
    let url = format!("{}/private", server.uri());
    cache.fetch(&url, &FetchOptions::default()).await.unwrap();
    cache.fetch(&url, &FetchOptions::default()).await.unwrap();
    assert!(cache.is_empty());
}

#[tokio::test]
async fn purge_url_forces_a_new_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/board.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8, 2, 3], "image/png"))
        .expect(2)
        .mount(&server)
        .await;

    let cache = cache_with(Arc::new(TokioClock), Duration::from_secs(60));
    let url = format!("{}/board.png", server.uri());
    cache.fetch(&url, &FetchOptions::default()).await.unwrap();
    assert!(cache.purge_url(&url));
    cache.fetch(&url, &FetchOptions::default()).await.unwrap();
    assert_eq!(cache.network_calls(), 2);
}

#[tokio::test]
async fn crawler_retries_server_errors_with_growing_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(html("<html>finally</html>"))
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let crawler = crawler_with(
        clock.clone(),
        CrawlSettings {
            backoff_base: Duration::from_millis(100),
            ..CrawlSettings::default()
        },
    );

    let body = crawler.get(&format!("{}/flaky", server.uri())).await.unwrap();
    assert_eq!(body.as_ref(), b"<html>finally</html>");

    let sleeps = clock.sleeps();
    assert_eq!(sleeps.len(), 2);
    assert!((Duration::from_millis(100)..=Duration::from_millis(150)).contains(&sleeps[0]));
    assert!((Duration::from_millis(200)..=Duration::from_millis(250)).contains(&sleeps[1]));
}

#[tokio::test]
async fn client_errors_fail_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/throttled"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let crawler = crawler_with(clock.clone(), CrawlSettings::default());

    let missing = crawler
        .fetch(&format!("{}/missing", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(missing.kind, FailureKind::HttpStatus(404));

    let throttled = crawler
        .fetch(&format!("{}/throttled", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(throttled.kind, FailureKind::BlockedHost);
    assert!(clock.sleeps().is_empty());
}

#[tokio::test]
async fn blocked_hosts_are_never_contacted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let crawler = crawler_with(
        Arc::new(ManualClock::new()),
        CrawlSettings {
            blocked_hosts: vec!["127.0.0.1".to_string()],
            ..CrawlSettings::default()
        },
    );
    let err = crawler
        .fetch(&format!("{}/anything", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::BlockedHost);
    assert_eq!(crawler.cache().network_calls(), 0);
}

#[tokio::test]
async fn slow_responses_time_out_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stuck"))
        .respond_with(html("<html>late</html>").set_delay(Duration::from_secs(2)))
        .expect(1)
        .mount(&server)
        .await;

    let crawler = crawler_with(
        Arc::new(ManualClock::new()),
        CrawlSettings {
            request_timeout: Duration::from_millis(100),
            ..CrawlSettings::default()
        },
    );
    let err = crawler
        .fetch(&format!("{}/stuck", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn user_agents_rotate_between_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("<html></html>"))
        .mount(&server)
        .await;

    let crawler = crawler_with(
        Arc::new(ManualClock::new()),
        CrawlSettings {
            user_agents: vec!["agent-one".into(), "agent-two".into()],
            ..CrawlSettings::default()
        },
    );
    crawler.get(&format!("{}/a", server.uri())).await.unwrap();
    crawler.get(&format!("{}/b", server.uri())).await.unwrap();

    let agents: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter_map(|request| request.headers.get("user-agent"))
        .filter_map(|value| value.to_str().ok().map(str::to_string))
        .collect();
    assert_eq!(agents, vec!["agent-one", "agent-two"]);
}

#[tokio::test]
async fn long_stale_entries_are_evicted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("<html></html>"))
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new());
    let cache = cache_with(clock.clone(), Duration::from_secs(60));
    cache
        .fetch(&format!("{}/old", server.uri()), &FetchOptions::default())
        .await
        .unwrap();
    clock.advance(Duration::from_secs(90));
    assert_eq!(cache.evict_stale(), 0);

    clock.advance(Duration::from_secs(31));
    assert_eq!(cache.evict_stale(), 1);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn size_variants_of_one_image_are_cached_apart() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![7u8; 4], "image/png"))
        .expect(2)
        .mount(&server)
        .await;

    let cache = cache_with(Arc::new(TokioClock), Duration::from_secs(60));
    let small = format!("{}/img?w=800", server.uri());
    let large = format!("{}/img?w=1600", server.uri());
    cache.fetch(&small, &FetchOptions::default()).await.unwrap();
    let large_first = cache.fetch(&large, &FetchOptions::default()).await.unwrap();
    let small_again = cache
        .fetch(&format!("{small}&utm_source=feed"), &FetchOptions::default())
        .await
        .unwrap();

    assert!(!large_first.from_cache);
    assert!(small_again.from_cache);
    assert_eq!(cache.len(), 2);
}
