//! Archive client: cache-first lookups, rate-limit retries and normalization.

use crate::integration::support::*;
use archlink::cache::CacheTier;
use archlink::config::{CacheSettings, NetworkSettings};
use archlink::error::FetchError;
use archlink::fetch::{ArchiveClient, HttpTransport};
use archlink::model::{PostKey, SourceFamily};
use archlink::site::{self, PageLocation};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn client(url: &str, transport: &Arc<FakeTransport>, network: NetworkSettings) -> ArchiveClient {
    let location = PageLocation::parse(url).unwrap();
    let schema = site::resolve(&location.host);
    ArchiveClient::new(
        Arc::clone(transport) as Arc<dyn HttpTransport>,
        schema,
        location,
        Arc::new(CacheTier::new(CacheSettings::default())),
        network,
    )
}

fn network(base_ms: u64, max_retries: u32) -> NetworkSettings {
    NetworkSettings {
        backoff_base_ms: base_ms,
        max_retries,
        ..NetworkSettings::default()
    }
}

#[tokio::test]
async fn test_cache_hit_makes_no_request() {
    let transport = FakeTransport::new();
    let client = client(FOURCHAN_URL, &transport, NetworkSettings::default());
    transport.respond(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100, 101]));

    let first = client.fetch_post("101", "g").await.unwrap();
    assert_eq!(transport.requests().len(), 1);

    let second = client.fetch_post("101", "g").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(transport.requests().len(), 1, "second lookup must be a cache hit");

    // The thread came along with the post.
    let thread = client.fetch_thread("100", "g").await.unwrap();
    assert_eq!(thread.posts.len(), 2);
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_then_success_backs_off() {
    let transport = FakeTransport::new();
    let client = client(FOURCHAN_URL, &transport, network(250, 3));
    transport.respond(FOURCHAN_THREAD_API, 429, "");
    transport.respond(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100]));

    let started = Instant::now();
    let post = client.fetch_post("100", "g").await.unwrap();
    assert_eq!(post.id, "100");
    assert_eq!(transport.count(FOURCHAN_THREAD_API), 2);

    let times = transport.request_times();
    assert!(times[1] - times[0] >= Duration::from_millis(250));
    assert!(started.elapsed() >= Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_exhaustion() {
    let transport = FakeTransport::new();
    let client = client(FOURCHAN_URL, &transport, network(100, 2));
    for _ in 0..3 {
        transport.respond(FOURCHAN_THREAD_API, 429, "");
    }

    let err = client.fetch_thread("100", "g").await.unwrap_err();
    match err {
        FetchError::RateLimitExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.count(FOURCHAN_THREAD_API), 3);

    // Linear backoff: 100ms then 200ms.
    let times = transport.request_times();
    assert!(times[1] - times[0] >= Duration::from_millis(100));
    assert!(times[2] - times[1] >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_other_statuses_are_not_retried() {
    let transport = FakeTransport::new();
    let client = client(FOURCHAN_URL, &transport, network(10, 3));
    transport.respond(FOURCHAN_THREAD_API, 500, "boom");

    let err = client.fetch_thread("100", "g").await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(transport.count(FOURCHAN_THREAD_API), 1);

    // Unscripted URLs answer 404.
    let err = client.fetch_thread("100", "g").await.unwrap_err();
    assert!(matches!(err, FetchError::Http { status: Some(404), .. }));
}

#[tokio::test]
async fn test_post_missing_from_thread_is_not_found() {
    let transport = FakeTransport::new();
    let client = client(FOURCHAN_URL, &transport, NetworkSettings::default());
    transport.respond(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100, 101]));

    let err = client.fetch_post("999", "g").await.unwrap_err();
    assert!(matches!(err, FetchError::NotFound { ref id, .. } if id == "999"));
}

#[tokio::test]
async fn test_minimal_fourchan_post_is_normalized() {
    let transport = FakeTransport::new();
    let client = client(FOURCHAN_URL, &transport, NetworkSettings::default());
    transport.respond(
        FOURCHAN_THREAD_API,
        200,
        r#"{"posts":[{"no":555,"time":1000,"com":"hi"}]}"#,
    );

    let thread = client.fetch_thread("100", "g").await.unwrap();
    let post = &thread.posts[0];
    assert_eq!(post.id, "555");
    assert_eq!(post.timestamp, 1_000_000);
    assert_eq!(post.body_html, "hi");
    assert_eq!(post.author, "Anonymous");
    assert!(post.media.is_none());
}

#[tokio::test]
async fn test_foolfuuka_post_written_through_cache() {
    let transport = FakeTransport::new();
    let client = client(FOOLFUUKA_URL, &transport, NetworkSettings::default());
    let url = foolfuuka_api("post", 7);
    transport.respond(&url, 200, foolfuuka_post_json(7, ">>1 hello"));

    let post = client.fetch_post("7", "a").await.unwrap();
    assert_eq!(post.source, SourceFamily::FoolFuuka);
    assert_eq!(post.board, "a");
    assert!(client.cache().get_post(&PostKey::new("a", "7")).is_some());

    client.fetch_post("7", "a").await.unwrap();
    assert_eq!(transport.count(&url), 1);
}

#[tokio::test]
async fn test_foolfuuka_error_body_is_not_found() {
    let transport = FakeTransport::new();
    let client = client(FOOLFUUKA_URL, &transport, NetworkSettings::default());
    transport.respond(&foolfuuka_api("post", 8), 200, r#"{"error":"Post not found."}"#);

    let err = client.fetch_post("8", "a").await.unwrap_err();
    assert!(matches!(err, FetchError::NotFound { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_replies_retry_any_failure() {
    let transport = FakeTransport::new();
    let client = client(FOOLFUUKA_URL, &transport, network(50, 3));
    let url = foolfuuka_api("backlinks", 1);
    transport.respond(&url, 502, "");
    transport.fail(
        &url,
        FetchError::Http {
            url: url.clone(),
            status: None,
            message: "connection reset".to_string(),
        },
    );
    transport.respond(&url, 200, foolfuuka_replies_json(&[2, 3, 2]));

    let replies = client.fetch_replies("1", "a").await.unwrap();
    assert_eq!(replies, vec!["2".to_string(), "3".to_string()]);
    assert_eq!(transport.count(&url), 3);
}

#[tokio::test(start_paused = true)]
async fn test_replies_give_up_with_last_error() {
    let transport = FakeTransport::new();
    let client = client(FOOLFUUKA_URL, &transport, network(50, 2));
    let url = foolfuuka_api("backlinks", 1);
    transport.respond(&url, 500, "");
    transport.respond(&url, 500, "");
    transport.respond(&url, 503, "");

    let err = client.fetch_replies("1", "a").await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(transport.count(&url), 3);
}

#[tokio::test]
async fn test_replies_unsupported_on_live_board() {
    let transport = FakeTransport::new();
    let client = client(FOURCHAN_URL, &transport, NetworkSettings::default());

    let err = client.fetch_replies("100", "g").await.unwrap_err();
    assert!(matches!(err, FetchError::UnsupportedSite { .. }));
    assert!(transport.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_is_terminal_and_uncached() {
    let transport = FakeTransport::new();
    let client = client(FOURCHAN_URL, &transport, network(10, 3));
    transport.hang(FOURCHAN_THREAD_API);

    let started = Instant::now();
    let err = client.fetch_post("101", "g").await.unwrap_err();
    assert_eq!(
        err,
        FetchError::Timeout {
            url: FOURCHAN_THREAD_API.to_string(),
            after_ms: 15_000,
        }
    );
    assert!(err.is_http());
    assert!(started.elapsed() >= Duration::from_secs(15));
    // Only 429 is retried.
    assert_eq!(transport.count(FOURCHAN_THREAD_API), 1);
    assert!(client.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_replies_retry_archive_error_body() {
    let transport = FakeTransport::new();
    let client = client(FOOLFUUKA_URL, &transport, network(50, 3));
    let url = foolfuuka_api("backlinks", 1);
    transport.respond(&url, 200, r#"{"error":"Thread not found."}"#);
    transport.hang(&url);
    transport.respond(&url, 200, foolfuuka_replies_json(&[4]));

    let replies = client.fetch_replies("1", "a").await.unwrap();
    assert_eq!(replies, vec!["4".to_string()]);
    assert_eq!(transport.count(&url), 3);
}

#[tokio::test(start_paused = true)]
async fn test_replies_archive_error_surfaces_after_retries() {
    let transport = FakeTransport::new();
    let client = client(FOOLFUUKA_URL, &transport, network(50, 1));
    let url = foolfuuka_api("backlinks", 1);
    transport.respond(&url, 200, r#"{"error":"busy"}"#);
    transport.respond(&url, 200, r#"{"error":"Thread not found."}"#);

    let err = client.fetch_replies("1", "a").await.unwrap_err();
    assert_eq!(
        err,
        FetchError::Archive {
            message: "Thread not found.".to_string()
        }
    );
    assert_eq!(transport.count(&url), 2);
}
