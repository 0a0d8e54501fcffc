//! Site schemas across families, including DOM-only and HTML-only sites.

use crate::integration::support::*;
use archlink::config::Settings;
use archlink::expand::{Activation, ExpansionSource};
use archlink::model::SourceFamily;
use archlink::site::{self, PageLocation};

#[test]
fn test_hosts_resolve_to_families() {
    let cases = [
        ("boards.4chan.org", "4chan", SourceFamily::FourChan),
        ("boards.4channel.org", "4chan", SourceFamily::FourChan),
        ("archive.4plebs.org", "4plebs", SourceFamily::FourPlebs),
        ("desuarchive.org", "foolfuuka", SourceFamily::FoolFuuka),
        ("www.archived.moe", "foolfuuka", SourceFamily::FoolFuuka),
        ("warosu.org", "warosu", SourceFamily::HtmlOnly),
        ("boards.fireden.net", "fireden", SourceFamily::HtmlOnly),
    ];
    for (host, name, family) in cases {
        let schema = site::resolve(host);
        assert_eq!(schema.name(), name, "{}", host);
        assert_eq!(schema.family(), family, "{}", host);
    }
    assert_eq!(site::resolve("example.com").name(), "generic");
    assert_eq!(site::resolve("  DESUARCHIVE.ORG ").name(), "foolfuuka");
}

#[test]
fn test_location_detected_from_document() {
    let page = archlink::dom::Page::parse(
        r#"<html><head><meta name="board" content="tv"></head><body><div class="thread" id="t4242"></div></body></html>"#,
    );
    let location = PageLocation::detect("https://example.com/", &page).unwrap();
    assert_eq!(location.board, "tv");
    assert_eq!(location.thread_id.as_deref(), Some("4242"));
}

const GENERIC_PAGE: &str = r##"<html><body><div class="thread" id="t10">
<div class="post-container" id="p10"><div class="message">op</div></div>
<div class="post-container" id="p11"><div class="message"><a href="#p10">&gt;&gt;10</a> <a href="#p5">&gt;&gt;5</a></div></div>
</div></body></html>"##;

#[tokio::test]
async fn test_generic_site_works_from_the_page_alone() {
    let transport = FakeTransport::new();
    let ctx = context("https://example.com/b/thread/10", GENERIC_PAGE, &transport, Settings::default());
    assert_eq!(ctx.schema().name(), "generic");

    let report = ctx.initialize().await.unwrap();
    assert_eq!(report.posts, 2);
    assert_eq!(ctx.backlinks_of("10"), vec!["11".to_string()]);

    let (on_page, off_page) = {
        let page = ctx.page().lock();
        let post = page.find_by_id("p11").unwrap();
        let links = page.query(post, "a[href*=\"#p\"]").unwrap();
        (links[0], links[1])
    };
    assert_eq!(
        ctx.activate(on_page).await.unwrap(),
        Activation::Expanded {
            source: ExpansionSource::Page
        }
    );

    // No API: the miss becomes an inline error without any request.
    let outcome = ctx.activate(off_page).await.unwrap();
    match outcome {
        Activation::Failed { reason } => assert!(reason.contains("generic")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(transport.requests().is_empty());
}

const WAROSU_URL: &str = "https://warosu.org/ck/thread/40";
const WAROSU_THREAD: &str = "https://warosu.org/ck/thread/40";

const WAROSU_PAGE: &str = r##"<html><body><div class="thread" id="t40">
<div class="post" data-id="41"><span class="postername">Anonymous</span><blockquote class="postbody"><a class="posterquote" href="#p39">&gt;&gt;39</a> what knife</blockquote></div>
</div></body></html>"##;

const WAROSU_REMOTE: &str = r##"<html><body>
<div class="post" data-id="39"><span class="postername">Chef</span><blockquote class="postbody">carbon steel</blockquote></div>
<div class="post" data-id="41"><span class="postername">Anonymous</span><blockquote class="postbody">what knife</blockquote></div>
</body></html>"##;

#[tokio::test]
async fn test_html_only_site_scrapes_thread_page() {
    let transport = FakeTransport::new();
    let ctx = context(WAROSU_URL, WAROSU_PAGE, &transport, Settings::default());
    transport.respond(WAROSU_THREAD, 200, WAROSU_REMOTE);
    ctx.initialize().await.unwrap();

    let link = {
        let page = ctx.page().lock();
        page.query_first(page.root(), "a.posterquote").unwrap().unwrap()
    };
    let outcome = ctx.activate(link).await.unwrap();
    assert_eq!(
        outcome,
        Activation::Expanded {
            source: ExpansionSource::Network
        }
    );
    assert_eq!(transport.count(WAROSU_THREAD), 1);
    let html = ctx.html();
    assert!(html.contains("carbon steel"));
    assert!(html.contains("Chef"));
}
