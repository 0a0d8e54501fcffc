//! Cache tier behind the archive client: expiry, capacity and the sweeper.

use crate::integration::support::*;
use archlink::cache::{CacheKind, CacheTier, Clock, ManualClock};
use archlink::config::{CacheSettings, NetworkSettings};
use archlink::fetch::{ArchiveClient, HttpTransport};
use archlink::model::PostKey;
use archlink::render::render_cached;
use archlink::session::PageContextBuilder;
use archlink::site::{self, PageLocation};
use std::sync::Arc;
use std::time::Duration;

fn client_with(transport: &Arc<FakeTransport>, cache: Arc<CacheTier>) -> ArchiveClient {
    let location = PageLocation::parse(FOURCHAN_URL).unwrap();
    ArchiveClient::new(
        Arc::clone(transport) as Arc<dyn HttpTransport>,
        site::resolve(&location.host),
        location,
        cache,
        NetworkSettings::default(),
    )
}

#[tokio::test]
async fn test_expired_post_is_refetched() {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let settings = CacheSettings {
        post_ttl_secs: 60,
        thread_ttl_secs: 60,
        ..CacheSettings::default()
    };
    let cache = Arc::new(CacheTier::with_clock(settings, Arc::clone(&clock) as Arc<dyn Clock>));
    let transport = FakeTransport::new();
    let client = client_with(&transport, Arc::clone(&cache));
    transport.respond(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100, 101]));
    transport.respond(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100, 101]));

    client.fetch_post("101", "g").await.unwrap();
    clock.advance(Duration::from_secs(59));
    client.fetch_post("101", "g").await.unwrap();
    assert_eq!(transport.count(FOURCHAN_THREAD_API), 1);

    clock.advance(Duration::from_secs(2));
    client.fetch_post("101", "g").await.unwrap();
    assert_eq!(transport.count(FOURCHAN_THREAD_API), 2);

    let stats = cache.stats();
    assert_eq!(stats.posts.hits, 1);
    assert_eq!(stats.posts.expired, 1);
}

#[tokio::test]
async fn test_disabled_cache_always_fetches() {
    let settings = CacheSettings {
        enabled: false,
        ..CacheSettings::default()
    };
    let cache = Arc::new(CacheTier::new(settings));
    let transport = FakeTransport::new();
    let client = client_with(&transport, Arc::clone(&cache));
    transport.respond(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100]));
    transport.respond(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100]));

    client.fetch_post("100", "g").await.unwrap();
    client.fetch_post("100", "g").await.unwrap();
    assert_eq!(transport.count(FOURCHAN_THREAD_API), 2);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_thread_write_respects_capacity() {
    let settings = CacheSettings {
        max_size: 3,
        ..CacheSettings::default()
    };
    let cache = Arc::new(CacheTier::new(settings));
    let transport = FakeTransport::new();
    let client = client_with(&transport, Arc::clone(&cache));
    transport.respond(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100, 101, 102, 103, 104]));

    client.fetch_thread("100", "g").await.unwrap();
    assert_eq!(cache.len(CacheKind::Post), 3);
    assert_eq!(cache.len(CacheKind::Thread), 1);
    // The earliest writes went first.
    assert!(cache.get_post(&PostKey::new("g", "100")).is_none());
    assert!(cache.get_post(&PostKey::new("g", "104")).is_some());
    assert_eq!(cache.stats().posts.evicted, 2);
}

#[tokio::test]
async fn test_rendered_html_is_reused() {
    let cache = Arc::new(CacheTier::new(CacheSettings::default()));
    let transport = FakeTransport::new();
    let client = client_with(&transport, Arc::clone(&cache));
    transport.respond(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100]));

    let post = client.fetch_post("100", "g").await.unwrap();
    let first = render_cached(&cache, &post);
    assert_eq!(cache.get_rendered(&post.key()), Some(first.clone()));
    assert_eq!(render_cached(&cache, &post), first);
    assert_eq!(cache.stats().rendered.hits, 2);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_evicts_expired_entries() {
    let clock = Arc::new(ManualClock::new(0));
    let settings = CacheSettings {
        post_ttl_secs: 10,
        ..CacheSettings::default()
    };
    let cache = Arc::new(CacheTier::with_clock(settings, Arc::clone(&clock) as Arc<dyn Clock>));
    let transport = FakeTransport::new();
    let client = client_with(&transport, Arc::clone(&cache));
    transport.respond(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100, 101]));
    client.fetch_thread("100", "g").await.unwrap();
    assert_eq!(cache.len(CacheKind::Post), 2);

    let sweeper = cache.spawn_sweeper(Duration::from_secs(30));
    clock.advance(Duration::from_secs(11));
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(cache.len(CacheKind::Post), 0);
    assert_eq!(cache.stats().posts.expired, 2);
    sweeper.abort();
}

#[tokio::test(start_paused = true)]
async fn test_page_context_runs_sweeper_until_dropped() {
    let clock = Arc::new(ManualClock::new(0));
    let transport = FakeTransport::new();
    let mut settings = fast_settings();
    settings.cache.post_ttl_secs = 10;
    settings.cache.thread_ttl_secs = 10;
    settings.cache.sweep_interval_secs = 60;
    let ctx = PageContextBuilder::from_html(FOURCHAN_URL, FOURCHAN_PAGE)
        .settings(settings)
        .transport(Arc::clone(&transport) as Arc<dyn HttpTransport>)
        .clock(Arc::clone(&clock) as Arc<dyn Clock>)
        .build()
        .unwrap();
    let cache = Arc::clone(ctx.cache());
    transport.respond(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100, 101]));
    ctx.client().fetch_thread("100", "g").await.unwrap();
    assert_eq!(cache.len(CacheKind::Post), 2);

    clock.advance(Duration::from_secs(3600));
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(cache.len(CacheKind::Post), 0);
    assert_eq!(cache.len(CacheKind::Thread), 0);

    // A dropped context stops sweeping its cache.
    drop(ctx);
    tokio::task::yield_now().await;
    transport.respond(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100]));
    let client = client_with(&transport, Arc::clone(&cache));
    client.fetch_thread("100", "g").await.unwrap();
    clock.advance(Duration::from_secs(3600));
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(cache.len(CacheKind::Post), 1);
}

#[test]
fn test_page_context_builds_without_runtime() {
    let transport = FakeTransport::new();
    let ctx = context(FOURCHAN_URL, FOURCHAN_PAGE, &transport, fast_settings());
    assert_eq!(ctx.cache().len(CacheKind::Post), 0);
}
