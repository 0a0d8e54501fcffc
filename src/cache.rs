//! Cache Tier
//!
//! Three independent shelves (posts, threads, rendered HTML) keyed by `(board, id)`.
//! Entries carry their write time; anything older than its kind's TTL is treated
//! as absent and deleted on access. Each shelf is bounded and evicts the oldest
//! writes first. Cache operations never fail: problems read as misses.

pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use crate::config::CacheSettings;
use crate::model::{Post, PostKey, Thread};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Post,
    Thread,
    RenderedHtml,
}

impl CacheKind {
    pub const ALL: [CacheKind; 3] = [CacheKind::Post, CacheKind::Thread, CacheKind::RenderedHtml];
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    written_at: i64,
    seq: u64,
}

#[derive(Debug)]
struct Shelf<T> {
    entries: HashMap<PostKey, Entry<T>>,
}

impl<T> Default for Shelf<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

enum Lookup<T> {
    Hit(T),
    Miss,
    Expired,
}

impl<T: Clone> Shelf<T> {
    fn get(&mut self, key: &PostKey, now: i64, ttl_ms: i64) -> Lookup<T> {
        match self.entries.get(key) {
            None => Lookup::Miss,
            Some(entry) if now - entry.written_at > ttl_ms => {
                self.entries.remove(key);
                Lookup::Expired
            }
            Some(entry) => Lookup::Hit(entry.value.clone()),
        }
    }

    fn put(&mut self, key: PostKey, value: T, now: i64, seq: u64) {
        self.entries.insert(
            key,
            Entry {
                value,
                written_at: now,
                seq,
            },
        );
    }

    /// Drop the `len - max` oldest writes.
    fn prune(&mut self, max: usize) -> usize {
        if self.entries.len() <= max {
            return 0;
        }
        let excess = self.entries.len() - max;
        let mut order: Vec<(i64, u64, PostKey)> = self
            .entries
            .iter()
            .map(|(k, e)| (e.written_at, e.seq, k.clone()))
            .collect();
        order.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        for (_, _, key) in order.into_iter().take(excess) {
            self.entries.remove(&key);
        }
        excess
    }

    fn evict_expired(&mut self, now: i64, ttl_ms: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| now - e.written_at <= ttl_ms);
        before - self.entries.len()
    }
}

/// Counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub evicted: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub posts: KindStats,
    pub threads: KindStats,
    pub rendered: KindStats,
}

impl CacheStats {
    pub fn kind(&self, kind: CacheKind) -> &KindStats {
        match kind {
            CacheKind::Post => &self.posts,
            CacheKind::Thread => &self.threads,
            CacheKind::RenderedHtml => &self.rendered,
        }
    }

    fn kind_mut(&mut self, kind: CacheKind) -> &mut KindStats {
        match kind {
            CacheKind::Post => &mut self.posts,
            CacheKind::Thread => &mut self.threads,
            CacheKind::RenderedHtml => &mut self.rendered,
        }
    }
}

/// Entries removed by one sweep, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub posts: usize,
    pub threads: usize,
    pub rendered: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.posts + self.threads + self.rendered
    }
}

#[derive(Debug, Default)]
struct Shelves {
    posts: Shelf<Post>,
    threads: Shelf<Thread>,
    rendered: Shelf<String>,
    seq: u64,
    stats: CacheStats,
}

impl Shelves {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn len(&self, kind: CacheKind) -> usize {
        match kind {
            CacheKind::Post => self.posts.entries.len(),
            CacheKind::Thread => self.threads.entries.len(),
            CacheKind::RenderedHtml => self.rendered.entries.len(),
        }
    }

    fn record<T>(&mut self, kind: CacheKind, lookup: Lookup<T>) -> Option<T> {
        let stats = self.stats.kind_mut(kind);
        match lookup {
            Lookup::Hit(v) => {
                stats.hits += 1;
                Some(v)
            }
            Lookup::Miss => {
                stats.misses += 1;
                None
            }
            Lookup::Expired => {
                stats.misses += 1;
                stats.expired += 1;
                None
            }
        }
    }
}

/// Shared, time-boxed cache for posts, threads and rendered post HTML.
#[derive(Debug)]
pub struct CacheTier {
    settings: CacheSettings,
    clock: Arc<dyn Clock>,
    inner: Mutex<Shelves>,
}

impl CacheTier {
    pub fn new(settings: CacheSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: CacheSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            inner: Mutex::new(Shelves::default()),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn ttl(&self, kind: CacheKind) -> Duration {
        let secs = match kind {
            CacheKind::Post => self.settings.post_ttl_secs,
            CacheKind::Thread => self.settings.thread_ttl_secs,
            CacheKind::RenderedHtml => self.settings.rendered_ttl_secs,
        };
        Duration::from_secs(secs)
    }

    fn ttl_ms(&self, kind: CacheKind) -> i64 {
        self.ttl(kind).as_millis() as i64
    }

    pub fn get_post(&self, key: &PostKey) -> Option<Post> {
        if !self.is_enabled() {
            return None;
        }
        let now = self.clock.now_millis();
        let ttl = self.ttl_ms(CacheKind::Post);
        let mut inner = self.inner.lock();
        let lookup = inner.posts.get(key, now, ttl);
        let hit = inner.record(CacheKind::Post, lookup);
        debug!(%key, hit = hit.is_some(), "post cache lookup");
        hit
    }

    pub fn put_post(&self, post: Post) {
        if !self.is_enabled() {
            return;
        }
        let now = self.clock.now_millis();
        let mut inner = self.inner.lock();
        self.put_post_locked(&mut inner, post, now);
        self.prune_locked(&mut inner, CacheKind::Post);
    }

    fn put_post_locked(&self, inner: &mut Shelves, post: Post, now: i64) {
        let seq = inner.next_seq();
        inner.posts.put(post.key(), post, now, seq);
    }

    pub fn get_thread(&self, key: &PostKey) -> Option<Thread> {
        if !self.is_enabled() {
            return None;
        }
        let now = self.clock.now_millis();
        let ttl = self.ttl_ms(CacheKind::Thread);
        let mut inner = self.inner.lock();
        let lookup = inner.threads.get(key, now, ttl);
        inner.record(CacheKind::Thread, lookup)
    }

    /// Store a thread and each of its posts.
    pub fn put_thread(&self, thread: Thread) {
        if !self.is_enabled() {
            return;
        }
        let now = self.clock.now_millis();
        let mut inner = self.inner.lock();
        for post in &thread.posts {
            self.put_post_locked(&mut inner, post.clone(), now);
        }
        let seq = inner.next_seq();
        inner.threads.put(thread.key(), thread, now, seq);
        self.prune_locked(&mut inner, CacheKind::Post);
        self.prune_locked(&mut inner, CacheKind::Thread);
    }

    pub fn get_rendered(&self, key: &PostKey) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        let now = self.clock.now_millis();
        let ttl = self.ttl_ms(CacheKind::RenderedHtml);
        let mut inner = self.inner.lock();
        let lookup = inner.rendered.get(key, now, ttl);
        inner.record(CacheKind::RenderedHtml, lookup)
    }

    pub fn put_rendered(&self, key: PostKey, html: String) {
        if !self.is_enabled() {
            return;
        }
        let now = self.clock.now_millis();
        let mut inner = self.inner.lock();
        let seq = inner.next_seq();
        inner.rendered.put(key, html, now, seq);
        self.prune_locked(&mut inner, CacheKind::RenderedHtml);
    }

    /// Enforce the size bound on one kind. Returns the number of evicted entries.
    pub fn prune_to_capacity(&self, kind: CacheKind) -> usize {
        let mut inner = self.inner.lock();
        self.prune_locked(&mut inner, kind)
    }

    fn prune_locked(&self, inner: &mut Shelves, kind: CacheKind) -> usize {
        let max = self.settings.max_size;
        let evicted = match kind {
            CacheKind::Post => inner.posts.prune(max),
            CacheKind::Thread => inner.threads.prune(max),
            CacheKind::RenderedHtml => inner.rendered.prune(max),
        };
        if evicted > 0 {
            inner.stats.kind_mut(kind).evicted += evicted as u64;
            debug!(?kind, evicted, "cache pruned to capacity");
        }
        evicted
    }

    /// Remove every entry past its TTL.
    pub fn evict_expired(&self) -> SweepReport {
        let now = self.clock.now_millis();
        let (post_ttl, thread_ttl, rendered_ttl) = (
            self.ttl_ms(CacheKind::Post),
            self.ttl_ms(CacheKind::Thread),
            self.ttl_ms(CacheKind::RenderedHtml),
        );
        let mut inner = self.inner.lock();
        let report = SweepReport {
            posts: inner.posts.evict_expired(now, post_ttl),
            threads: inner.threads.evict_expired(now, thread_ttl),
            rendered: inner.rendered.evict_expired(now, rendered_ttl),
        };
        inner.stats.posts.expired += report.posts as u64;
        inner.stats.threads.expired += report.threads as u64;
        inner.stats.rendered.expired += report.rendered as u64;
        report
    }

    /// Drop one kind, or everything with `None`.
    pub fn clear(&self, kind: Option<CacheKind>) {
        let kinds: &[CacheKind] = match &kind {
            Some(k) => std::slice::from_ref(k),
            None => &CacheKind::ALL,
        };
        let mut inner = self.inner.lock();
        for k in kinds {
            match k {
                CacheKind::Post => inner.posts.entries.clear(),
                CacheKind::Thread => inner.threads.entries.clear(),
                CacheKind::RenderedHtml => inner.rendered.entries.clear(),
            }
        }
    }

    /// Physically present entries, expired or not.
    pub fn len(&self, kind: CacheKind) -> usize {
        self.inner.lock().len(kind)
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        CacheKind::ALL.iter().all(|&k| inner.len(k) == 0)
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let mut stats = inner.stats;
        stats.posts.entries = inner.len(CacheKind::Post);
        stats.threads.entries = inner.len(CacheKind::Thread);
        stats.rendered.entries = inner.len(CacheKind::RenderedHtml);
        stats
    }

    /// Run [`CacheTier::evict_expired`] every `interval` until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = cache.evict_expired();
                if report.total() > 0 {
                    info!(
                        posts = report.posts,
                        threads = report.threads,
                        rendered = report.rendered,
                        "cache sweep removed expired entries"
                    );
                }
            }
        })
    }
}
