//! Shared fixtures for integration tests
//!
//! A scripted transport standing in for archive APIs, plus page and API
//! fixtures for the 4chan and FoolFuuka families.

use archlink::config::Settings;
use archlink::error::FetchError;
use archlink::fetch::{Accept, HttpResponse, HttpTransport};
use archlink::session::{PageContext, PageContextBuilder};
use archlink::state::UserState;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;

enum Scripted {
    Respond(HttpResponse),
    Fail(FetchError),
    /// Held until the gate is opened.
    Gated(Arc<Notify>, HttpResponse),
    /// Never answers.
    Hang,
}

/// Transport answering from per-URL queues. Unscripted URLs get a 404.
#[derive(Default)]
pub struct FakeTransport {
    script: Mutex<HashMap<String, VecDeque<Scripted>>>,
    log: Mutex<Vec<(String, Instant)>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, url: &str, entry: Scripted) {
        self.script
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(entry);
    }

    pub fn respond(&self, url: &str, status: u16, body: impl Into<String>) {
        self.push(url, Scripted::Respond(HttpResponse::new(status, body)));
    }

    pub fn fail(&self, url: &str, error: FetchError) {
        self.push(url, Scripted::Fail(error));
    }

    /// Queue a response that is only delivered after the returned gate fires.
    pub fn gate(&self, url: &str, status: u16, body: impl Into<String>) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.push(
            url,
            Scripted::Gated(Arc::clone(&gate), HttpResponse::new(status, body)),
        );
        gate
    }

    /// Queue a request that never completes.
    pub fn hang(&self, url: &str) {
        self.push(url, Scripted::Hang);
    }

    pub fn requests(&self) -> Vec<String> {
        self.log.lock().iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn request_times(&self) -> Vec<Instant> {
        self.log.lock().iter().map(|(_, at)| *at).collect()
    }

    pub fn count(&self, url: &str) -> usize {
        self.log.lock().iter().filter(|(u, _)| u == url).count()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get(&self, url: &str, _accept: Accept) -> Result<HttpResponse, FetchError> {
        self.log.lock().push((url.to_string(), Instant::now()));
        let next = self
            .script
            .lock()
            .get_mut(url)
            .and_then(|queue| queue.pop_front());
        match next {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Gated(gate, response)) => {
                gate.notified().await;
                Ok(response)
            }
            Some(Scripted::Hang) => std::future::pending().await,
            None => Ok(HttpResponse::new(404, "not scripted")),
        }
    }
}

pub const FOURCHAN_URL: &str = "https://boards.4chan.org/g/thread/100";
pub const FOURCHAN_THREAD_API: &str = "https://a.4cdn.org/g/thread/100.json";

/// Thread 100 with an OP, a reply quoting it and a reply quoting post 999,
/// which is not on the page.
pub const FOURCHAN_PAGE: &str = r##"<html><body><div class="board"><div class="thread" id="t100">
<div class="postContainer opContainer" id="pc100"><div class="post op" id="p100"><div class="postInfo"><span class="name">Anonymous</span></div><blockquote class="postMessage" id="m100">Rust thread</blockquote></div></div>
<div class="postContainer replyContainer" id="pc101"><div class="post reply" id="p101"><div class="postInfo"><span class="name">Anonymous</span></div><blockquote class="postMessage" id="m101"><a href="#p100" class="quotelink">&gt;&gt;100</a><br>borrow checker</blockquote></div></div>
<div class="postContainer replyContainer" id="pc102"><div class="post reply" id="p102"><div class="postInfo"><span class="name">Anonymous</span></div><blockquote class="postMessage" id="m102"><a href="#p999" class="quotelink">&gt;&gt;999</a><br>source?</blockquote></div></div>
</div></div></body></html>"##;

/// Markup of a reply appended to thread 100.
pub fn fourchan_reply(id: u64, quotes: &[u64]) -> String {
    let links: String = quotes
        .iter()
        .map(|q| format!(r##"<a href="#p{q}" class="quotelink">&gt;&gt;{q}</a><br>"##))
        .collect();
    format!(
        r#"<div class="postContainer replyContainer" id="pc{id}"><div class="post reply" id="p{id}"><blockquote class="postMessage" id="m{id}">{links}reply {id}</blockquote></div></div>"#
    )
}

/// 4chan API body for thread 100 carrying the given post numbers.
pub fn fourchan_thread_json(ids: &[u64]) -> String {
    let posts: Vec<serde_json::Value> = ids
        .iter()
        .map(|&no| {
            json!({
                "no": no,
                "time": 1_700_000_000 + no as i64,
                "name": "Anonymous",
                "com": format!("post {}", no),
            })
        })
        .collect();
    json!({ "posts": posts }).to_string()
}

pub const FOOLFUUKA_URL: &str = "https://desuarchive.org/a/thread/1/";

pub const FOOLFUUKA_PAGE: &str = r##"<html><body><div class="thread" data-thread-num="1">
<article class="post" id="p1" data-post-id="1"><div class="post_wrapper"><span class="name">Anonymous</span><div class="text">op text</div></div></article>
<article class="post" id="p2" data-post-id="2"><div class="post_wrapper"><span class="name">Anonymous</span><div class="text"><a class="postlink" href="https://desuarchive.org/a/post/1/">&gt;&gt;1</a> reply</div></div></article>
</div></body></html>"##;

pub fn foolfuuka_api(endpoint: &str, num: u64) -> String {
    format!(
        "https://desuarchive.org/_/api/chan/{}/?board=a&num={}",
        endpoint, num
    )
}

pub fn foolfuuka_post_json(num: u64, comment: &str) -> String {
    json!({
        "num": num,
        "thread_num": 1,
        "timestamp": 1_600_000_000,
        "name": "Anonymous",
        "comment": comment,
        "board": { "shortname": "a" },
    })
    .to_string()
}

pub fn foolfuuka_replies_json(nums: &[u64]) -> String {
    let backlinks: Vec<serde_json::Value> = nums.iter().map(|n| json!({ "num": n })).collect();
    json!({ "backlinks": backlinks }).to_string()
}

/// Settings with a short backoff so retries stay fast.
pub fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.network.backoff_base_ms = 10;
    settings.discovery.default_delay_ms = 5;
    settings
}

pub fn context(url: &str, html: &str, transport: &Arc<FakeTransport>, settings: Settings) -> PageContext {
    PageContextBuilder::from_html(url, html)
        .settings(settings)
        .transport(Arc::clone(transport) as Arc<dyn HttpTransport>)
        .user_state(UserState::in_memory())
        .build()
        .expect("page context")
}
