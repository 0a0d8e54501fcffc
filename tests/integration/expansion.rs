//! Inline expansion end to end: page clones, cache, network and stale responses.

use crate::integration::support::*;
use archlink::config::Settings;
use archlink::dom::NodeId;
use archlink::expand::{
    Activation, ExpansionSource, ExpansionState, CLONE_CLASS, ERROR_CLASS, EXPANSION_CLASS,
};
use archlink::session::PageContext;

fn quote_link(ctx: &PageContext, post: &str) -> NodeId {
    let page = ctx.page().lock();
    let node = page.find_by_id(&format!("p{}", post)).unwrap();
    page.query_first(node, "a.quotelink").unwrap().unwrap()
}

fn backlink(ctx: &PageContext, post: &str) -> NodeId {
    let page = ctx.page().lock();
    let node = page.find_by_id(&format!("p{}", post)).unwrap();
    page.query_first(node, "a.backlink").unwrap().unwrap()
}

async fn ready(settings: Settings) -> (PageContext, std::sync::Arc<FakeTransport>) {
    let transport = FakeTransport::new();
    let ctx = context(FOURCHAN_URL, FOURCHAN_PAGE, &transport, settings);
    ctx.initialize().await.unwrap();
    (ctx, transport)
}

#[tokio::test]
async fn test_post_on_page_expands_without_fetch() {
    let (ctx, transport) = ready(Settings::default()).await;
    let link = quote_link(&ctx, "101");

    let outcome = ctx.activate(link).await.unwrap();
    assert_eq!(
        outcome,
        Activation::Expanded {
            source: ExpansionSource::Page
        }
    );
    assert!(transport.requests().is_empty());
    assert_eq!(ctx.expansion().state(link), ExpansionState::Expanded);

    {
        let page = ctx.page().lock();
        let container = page.next_element_sibling(link).unwrap();
        assert!(page.has_class(container, EXPANSION_CLASS));
        let copy = page.query_first(container, &format!(".{}", CLONE_CLASS)).unwrap().unwrap();
        assert_eq!(page.attr(copy, "data-post-id"), Some("100"));
        assert!(page.attr(copy, "id").is_none(), "the copy must not duplicate element ids");
        assert!(page.text_content(copy).contains("Rust thread"));
    }

    assert_eq!(ctx.activate(link).await.unwrap(), Activation::Collapsed);
    assert_eq!(ctx.expansion().state(link), ExpansionState::Collapsed);
    let page = ctx.page().lock();
    assert!(page.query(page.root(), &format!(".{}", EXPANSION_CLASS)).unwrap().is_empty());
}

#[tokio::test]
async fn test_absent_post_fetched_once_then_cached() {
    let (ctx, transport) = ready(Settings::default()).await;
    transport.respond(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100, 101, 102, 999]));
    let link = quote_link(&ctx, "102");

    let outcome = ctx.activate(link).await.unwrap();
    assert_eq!(
        outcome,
        Activation::Expanded {
            source: ExpansionSource::Network
        }
    );
    assert_eq!(transport.count(FOURCHAN_THREAD_API), 1);
    assert!(ctx.html().contains("post 999"));

    assert_eq!(ctx.activate(link).await.unwrap(), Activation::Collapsed);
    let outcome = ctx.activate(link).await.unwrap();
    assert_eq!(
        outcome,
        Activation::Expanded {
            source: ExpansionSource::Cache
        }
    );
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_failed_fetch_renders_error_block() {
    let (ctx, transport) = ready(Settings::default()).await;
    transport.respond(FOURCHAN_THREAD_API, 503, "");
    let link = quote_link(&ctx, "102");

    let outcome = ctx.activate(link).await.unwrap();
    assert!(matches!(outcome, Activation::Failed { .. }));
    assert_eq!(ctx.expansion().state(link), ExpansionState::Error);
    let container = ctx.expansion().container(link).unwrap();
    {
        let page = ctx.page().lock();
        assert!(page.has_class(container, ERROR_CLASS));
        assert!(page.text_content(container).contains("503"));
    }

    // Activating an errored link clears the block.
    assert_eq!(ctx.activate(link).await.unwrap(), Activation::Collapsed);
    assert!(!ctx.page().lock().is_attached(container));
}

#[tokio::test]
async fn test_stale_response_is_discarded() {
    let (ctx, transport) = ready(Settings::default()).await;
    let gate = transport.gate(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100, 999]));
    let link = quote_link(&ctx, "102");

    let activation = ctx.activate(link);
    let reset = async {
        tokio::task::yield_now().await;
        assert_eq!(ctx.expansion().state(link), ExpansionState::Loading);
        let container = ctx.expansion().container(link).unwrap();
        assert!(ctx.expansion().dismiss(container));
        gate.notify_one();
    };
    let (outcome, ()) = futures::join!(activation, reset);

    assert_eq!(outcome.unwrap(), Activation::Discarded);
    assert_eq!(ctx.expansion().state(link), ExpansionState::Collapsed);
    assert!(!ctx.html().contains("post 999"));
    let page = ctx.page().lock();
    assert!(page.query(page.root(), &format!(".{}", EXPANSION_CLASS)).unwrap().is_empty());
}

#[tokio::test]
async fn test_second_activation_while_loading() {
    let (ctx, transport) = ready(Settings::default()).await;
    let gate = transport.gate(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100, 999]));
    let link = quote_link(&ctx, "102");

    let first = ctx.activate(link);
    let second = async {
        tokio::task::yield_now().await;
        let outcome = ctx.activate(link).await;
        gate.notify_one();
        outcome
    };
    let (first, second) = futures::join!(first, second);

    assert_eq!(second.unwrap(), Activation::AlreadyLoading);
    assert!(matches!(first.unwrap(), Activation::Expanded { .. }));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_nested_expansion_depth_limit() {
    let mut settings = Settings::default();
    settings.expansion.max_depth = 1;
    let (ctx, _transport) = ready(settings).await;

    // Open the reply from the OP's backlink; the copy carries its own quote link.
    let link = backlink(&ctx, "100");
    assert!(matches!(ctx.activate(link).await.unwrap(), Activation::Expanded { .. }));
    let nested = {
        let page = ctx.page().lock();
        let container = ctx.expansion().container(link).unwrap();
        page.query_first(container, "a.quotelink").unwrap().unwrap()
    };
    assert_eq!(ctx.activate(nested).await.unwrap(), Activation::DepthLimited);
}

#[tokio::test]
async fn test_disabled_expansion() {
    let mut settings = Settings::default();
    settings.expansion.enabled = false;
    let (ctx, transport) = ready(settings).await;

    let link = quote_link(&ctx, "102");
    assert_eq!(ctx.activate(link).await.unwrap(), Activation::Disabled);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_auto_expand_on_new_reply() {
    let mut settings = Settings::default();
    settings.expansion.auto_expand = true;
    settings.expansion.max_auto_expand = 5;
    let (ctx, transport) = ready(settings).await;
    transport.respond(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100, 777]));

    let records = ctx.mutate(|page| {
        let thread = page.find_by_id("t100").unwrap();
        page.append_html(thread, &fourchan_reply(103, &[100, 777]));
    });
    let report = ctx.process_mutations(records).await;

    // Only the off-page target is expanded.
    assert_eq!(report.auto_expanded, 1);
    assert_eq!(transport.count(FOURCHAN_THREAD_API), 1);
    assert!(ctx.html().contains("post 777"));
}

#[tokio::test]
async fn test_repeated_toggling_reuses_arena_slots() {
    let (ctx, transport) = ready(Settings::default()).await;
    transport.respond(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100, 999]));
    let on_page = quote_link(&ctx, "101");
    let remote = quote_link(&ctx, "102");

    for link in [on_page, remote] {
        assert!(matches!(ctx.activate(link).await.unwrap(), Activation::Expanded { .. }));
        assert_eq!(ctx.activate(link).await.unwrap(), Activation::Collapsed);
    }
    let capacity = ctx.page().lock().capacity();
    let live = ctx.page().lock().len();

    for _ in 0..20 {
        for link in [on_page, remote] {
            assert!(matches!(ctx.activate(link).await.unwrap(), Activation::Expanded { .. }));
            assert_eq!(ctx.activate(link).await.unwrap(), Activation::Collapsed);
        }
    }
    let page = ctx.page().lock();
    assert_eq!(page.capacity(), capacity);
    assert_eq!(page.len(), live);
    assert_eq!(transport.count(FOURCHAN_THREAD_API), 1);
}
