//! User state: own posts, last-seen tracking and the sled store.

use crate::integration::support::*;
use archlink::cli::{Cli, RunContext};
use archlink::config::{ArchlinkConfig, Settings};
use archlink::fetch::HttpTransport;
use archlink::model::PostKey;
use archlink::session::{PageContextBuilder, OWN_POST_CLASS};
use archlink::state::{SledStateStore, StateStore, UserState, OWN_POSTS_KEY};
use clap::Parser;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_concurrent_toggles_are_not_lost() {
    let state = UserState::in_memory();
    let toggles = (1..=20).map(|id| {
        let state = state.clone();
        async move { state.toggle_own_post(&PostKey::new("g", id.to_string())).await }
    });
    let results = futures::future::join_all(toggles).await;
    assert!(results.into_iter().all(|r| r.unwrap()));
    assert_eq!(state.own_posts().await.unwrap().len(), 20);
}

#[tokio::test]
async fn test_sled_store_keeps_own_posts() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SledStateStore::open(dir.path().join("state").join("db")).unwrap());
    let state = UserState::new(Arc::clone(&store) as Arc<dyn StateStore>);

    assert!(state.toggle_own_post(&PostKey::new("a", "5")).await.unwrap());
    assert!(state.toggle_own_post(&PostKey::new("g", "7")).await.unwrap());
    assert!(!state.toggle_own_post(&PostKey::new("a", "5")).await.unwrap());

    let raw = store.get(OWN_POSTS_KEY).await.unwrap().unwrap();
    assert_eq!(raw, json!(["g:7"]));
    assert!(store.db().contains_key(OWN_POSTS_KEY).unwrap());
}

#[tokio::test]
async fn test_stored_own_posts_marked_on_initialize() {
    let state = UserState::in_memory();
    state.toggle_own_post(&PostKey::new("g", "101")).await.unwrap();
    // Same number on another board is not ours.
    state.toggle_own_post(&PostKey::new("v", "102")).await.unwrap();

    let transport = FakeTransport::new();
    let ctx = PageContextBuilder::from_html(FOURCHAN_URL, FOURCHAN_PAGE)
        .settings(Settings::default())
        .transport(Arc::clone(&transport) as Arc<dyn HttpTransport>)
        .user_state(state)
        .build()
        .unwrap();
    let report = ctx.initialize().await.unwrap();

    assert_eq!(report.own_marked, 1);
    let page = ctx.page().lock();
    assert!(page.has_class(page.find_by_id("p101").unwrap(), OWN_POST_CLASS));
    assert!(!page.has_class(page.find_by_id("p102").unwrap(), OWN_POST_CLASS));
}

#[tokio::test]
async fn test_new_own_post_marked_during_mutation_pass() {
    let transport = FakeTransport::new();
    let ctx = context(FOURCHAN_URL, FOURCHAN_PAGE, &transport, Settings::default());
    ctx.user_state()
        .unwrap()
        .toggle_own_post(&PostKey::new("g", "103"))
        .await
        .unwrap();
    ctx.initialize().await.unwrap();

    let records = ctx.mutate(|page| {
        let thread = page.find_by_id("t100").unwrap();
        page.append_html(thread, &fourchan_reply(103, &[100]));
    });
    let report = ctx.process_mutations(records).await;
    assert_eq!(report.own_marked, 1);
}

#[tokio::test]
async fn test_last_seen_never_moves_back() {
    let transport = FakeTransport::new();
    let ctx = context(FOURCHAN_URL, FOURCHAN_PAGE, &transport, Settings::default());
    let state = ctx.user_state().unwrap().clone();

    state.mark_seen("g", "100", 500).await.unwrap();
    assert_eq!(ctx.mark_seen().await.unwrap(), Some(500));
    assert_eq!(state.last_seen("g", "100").await.unwrap(), Some(500));
    assert_eq!(state.last_seen("g", "200").await.unwrap(), None);
}

#[tokio::test]
async fn test_new_posts_check_against_thread() {
    let transport = FakeTransport::new();
    let ctx = context(FOURCHAN_URL, FOURCHAN_PAGE, &transport, Settings::default());
    transport.respond(FOURCHAN_THREAD_API, 200, fourchan_thread_json(&[100, 101, 102, 103, 104]));

    let missing = ctx.check_for_new_posts().await.unwrap();
    assert_eq!(missing, vec!["103".to_string(), "104".to_string()]);
}

#[test]
fn test_cli_own_commands_over_sled() {
    let dir = TempDir::new().unwrap();
    let store = SledStateStore::open(dir.path().join("state")).unwrap();
    let state = UserState::new(Arc::new(store));
    let context = RunContext::with_config(ArchlinkConfig::default(), Some(state)).unwrap();

    let toggle = Cli::try_parse_from(["archlink", "own", "toggle", "g", "42"]).unwrap();
    assert_eq!(context.execute(&toggle.command).unwrap(), "Marked g:42 as your post");

    let list = Cli::try_parse_from(["archlink", "own", "list", "--format", "json"]).unwrap();
    let out = context.execute(&list.command).unwrap();
    let keys: Vec<String> = serde_json::from_str(&out).unwrap();
    assert_eq!(keys, vec!["g:42".to_string()]);
}
