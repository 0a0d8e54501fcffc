//! Reply discovery against the FoolFuuka backlinks endpoint.

use crate::integration::support::*;
use archlink::error::ArchlinkError;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_discovery_adds_remote_replies() {
    let transport = FakeTransport::new();
    let ctx = context(FOOLFUUKA_URL, FOOLFUUKA_PAGE, &transport, fast_settings());
    ctx.initialize().await.unwrap();
    transport.respond(&foolfuuka_api("backlinks", 1), 200, foolfuuka_replies_json(&[2, 50]));
    transport.respond(&foolfuuka_api("backlinks", 2), 200, foolfuuka_replies_json(&[51]));

    let report = ctx.discover_remote_backlinks().await.unwrap();
    assert_eq!(report.passes, 1);
    assert_eq!(report.requests, 2);
    // 2 -> 1 was already known from the page.
    assert_eq!(report.edges_added, 2);
    assert!(report.failed.is_empty());
    assert_eq!(ctx.backlinks_of("1"), vec!["2".to_string(), "50".to_string()]);
    assert_eq!(ctx.backlinks_of("2"), vec!["51".to_string()]);
    assert_eq!(report.backlinks_rendered, 2);

    // Requests are spaced by the configured delay.
    let times = transport.request_times();
    assert!(times[1] - times[0] >= Duration::from_millis(5));
}

#[tokio::test(start_paused = true)]
async fn test_discovery_stops_after_max_passes() {
    let transport = FakeTransport::new();
    let mut settings = fast_settings();
    settings.network.max_retries = 0;
    settings.discovery.max_passes = 2;
    let ctx = context(FOOLFUUKA_URL, FOOLFUUKA_PAGE, &transport, settings);
    ctx.initialize().await.unwrap();
    transport.respond(&foolfuuka_api("backlinks", 1), 200, foolfuuka_replies_json(&[]));
    // Post 2 fails every time; unscripted requests answer 404.

    let report = ctx.discover_remote_backlinks().await.unwrap();
    assert_eq!(report.passes, 2);
    assert_eq!(report.requests, 3);
    assert_eq!(report.failed, vec!["2".to_string()]);
    assert_eq!(transport.count(&foolfuuka_api("backlinks", 2)), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_lookup_recovers_in_later_pass() {
    let transport = FakeTransport::new();
    let mut settings = fast_settings();
    settings.network.max_retries = 0;
    let ctx = context(FOOLFUUKA_URL, FOOLFUUKA_PAGE, &transport, settings);
    ctx.initialize().await.unwrap();
    transport.respond(&foolfuuka_api("backlinks", 1), 200, foolfuuka_replies_json(&[2]));
    transport.respond(&foolfuuka_api("backlinks", 2), 502, "");
    transport.respond(&foolfuuka_api("backlinks", 2), 200, foolfuuka_replies_json(&[60]));

    let report = ctx.discover_remote_backlinks().await.unwrap();
    assert_eq!(report.passes, 2);
    assert!(report.failed.is_empty());
    assert_eq!(ctx.backlinks_of("2"), vec!["60".to_string()]);
}

#[tokio::test]
async fn test_discovery_unsupported_on_live_board() {
    let transport = FakeTransport::new();
    let ctx = context(FOURCHAN_URL, FOURCHAN_PAGE, &transport, fast_settings());
    ctx.initialize().await.unwrap();

    let err = ctx.discover_remote_backlinks().await.unwrap_err();
    assert!(matches!(err, ArchlinkError::Fetch(_)));
    assert!(transport.requests().is_empty());
}
