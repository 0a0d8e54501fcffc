//! Page context
//!
//! One [`PageContext`] per augmented page. It owns the page, the quote graph,
//! the cache handle, the archive client and the expansion controller, so two
//! pages never share mutable state unless a cache is passed in explicitly.

use crate::cache::{CacheTier, Clock};
use crate::config::Settings;
use crate::dom::{MutationRecord, NodeId, Page, Selector};
use crate::error::{ArchlinkError, FetchError};
use crate::expand::{Activation, ExpansionController};
use crate::fetch::{ArchiveClient, HttpTransport, ReqwestTransport};
use crate::graph::{find_post, index_subtree, is_owned_ui, render_backlinks, QuoteGraph};
use crate::highlight::Highlighter;
use crate::model::PostKey;
use crate::site::{self, PageLocation, SiteSchema};
use crate::state::UserState;
use crate::watch::{classify, MutationSink, MutationWatcher};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Added to posts the user marked as their own.
pub const OWN_POST_CLASS: &str = "archlink-own-post";

/// What one scan or incremental pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub roots: usize,
    pub posts: usize,
    pub links_indexed: usize,
    pub edges_added: usize,
    pub backlinks_rendered: usize,
    pub highlighted: usize,
    pub own_marked: usize,
    pub auto_expanded: usize,
}

/// Outcome of [`PageContext::discover_remote_backlinks`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub passes: u32,
    pub requests: usize,
    pub edges_added: usize,
    pub backlinks_rendered: usize,
    /// Posts still failing after the last pass.
    pub failed: Vec<String>,
}

/// Builder for [`PageContext`].
pub struct PageContextBuilder {
    url: String,
    page: Page,
    settings: Settings,
    transport: Option<Arc<dyn HttpTransport>>,
    cache: Option<Arc<CacheTier>>,
    clock: Option<Arc<dyn Clock>>,
    schema: Option<Arc<dyn SiteSchema>>,
    user_state: Option<UserState>,
}

impl PageContextBuilder {
    pub fn new(url: impl Into<String>, page: Page) -> Self {
        Self {
            url: url.into(),
            page,
            settings: Settings::default(),
            transport: None,
            cache: None,
            clock: None,
            schema: None,
            user_state: None,
        }
    }

    pub fn from_html(url: impl Into<String>, html: &str) -> Self {
        Self::new(url, Page::parse(html))
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share a cache with other contexts.
    pub fn cache(mut self, cache: Arc<CacheTier>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Clock for a context-owned cache. Ignored when a cache is supplied.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Skip hostname resolution.
    pub fn schema(mut self, schema: Arc<dyn SiteSchema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn user_state(mut self, state: UserState) -> Self {
        self.user_state = Some(state);
        self
    }

    pub fn build(self) -> Result<PageContext, ArchlinkError> {
        let location = PageLocation::detect(&self.url, &self.page)?;
        let schema = self
            .schema
            .unwrap_or_else(|| site::resolve(&location.host));
        let settings = self.settings;

        let cache = match (self.cache, self.clock) {
            (Some(cache), _) => cache,
            (None, Some(clock)) => Arc::new(CacheTier::with_clock(settings.cache.clone(), clock)),
            (None, None) => Arc::new(CacheTier::new(settings.cache.clone())),
        };
        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(t) => t,
            None => Arc::new(ReqwestTransport::new(&settings.network)?),
        };

        let page = Arc::new(Mutex::new(self.page));
        let graph = Arc::new(Mutex::new(QuoteGraph::new()));
        let client = Arc::new(ArchiveClient::new(
            transport,
            Arc::clone(&schema),
            location.clone(),
            Arc::clone(&cache),
            settings.network.clone(),
        ));
        let expansion = ExpansionController::new(
            Arc::clone(&page),
            Arc::clone(&graph),
            Arc::clone(&client),
            settings.expansion.clone(),
        );
        let highlighter = Highlighter::from_settings(&settings.highlight);
        let sweeper = start_sweeper(&cache, settings.cache.sweep_interval_secs);

        info!(
            url = %location.url,
            schema = schema.name(),
            board = %location.board,
            thread = ?location.thread_id,
            "Page context created"
        );

        Ok(PageContext {
            page,
            location,
            schema,
            cache,
            graph,
            client,
            expansion,
            highlighter,
            user_state: self.user_state,
            own_posts: Mutex::new(HashSet::new()),
            settings,
            passes: AtomicU64::new(0),
            sweeper,
        })
    }
}

/// Periodic expiry sweep, when the cache is on and a runtime is available.
fn start_sweeper(cache: &Arc<CacheTier>, interval_secs: u64) -> Option<JoinHandle<()>> {
    if !cache.is_enabled() || interval_secs == 0 {
        return None;
    }
    if tokio::runtime::Handle::try_current().is_err() {
        debug!("No async runtime, cache sweeper not started");
        return None;
    }
    Some(cache.spawn_sweeper(Duration::from_secs(interval_secs)))
}

/// Everything needed to augment one page.
pub struct PageContext {
    page: Arc<Mutex<Page>>,
    location: PageLocation,
    schema: Arc<dyn SiteSchema>,
    cache: Arc<CacheTier>,
    graph: Arc<Mutex<QuoteGraph>>,
    client: Arc<ArchiveClient>,
    expansion: ExpansionController,
    highlighter: Highlighter,
    user_state: Option<UserState>,
    own_posts: Mutex<HashSet<PostKey>>,
    settings: Settings,
    passes: AtomicU64,
    sweeper: Option<JoinHandle<()>>,
}

impl Drop for PageContext {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

impl PageContext {
    pub fn builder(url: impl Into<String>, page: Page) -> PageContextBuilder {
        PageContextBuilder::new(url, page)
    }

    pub fn page(&self) -> &Arc<Mutex<Page>> {
        &self.page
    }

    pub fn location(&self) -> &PageLocation {
        &self.location
    }

    pub fn schema(&self) -> &Arc<dyn SiteSchema> {
        &self.schema
    }

    pub fn cache(&self) -> &Arc<CacheTier> {
        &self.cache
    }

    pub fn graph(&self) -> &Arc<Mutex<QuoteGraph>> {
        &self.graph
    }

    pub fn client(&self) -> &Arc<ArchiveClient> {
        &self.client
    }

    pub fn expansion(&self) -> &ExpansionController {
        &self.expansion
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn user_state(&self) -> Option<&UserState> {
        self.user_state.as_ref()
    }

    /// Incremental passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Sources quoting `id`, as currently known.
    pub fn backlinks_of(&self, id: &str) -> Vec<String> {
        self.graph.lock().backlinks_of(id).to_vec()
    }

    /// Serialized page.
    pub fn html(&self) -> String {
        self.page.lock().to_html()
    }

    /// Full scan of the page as loaded.
    #[instrument(skip(self), fields(schema = self.schema.name()))]
    pub async fn initialize(&self) -> Result<PassReport, ArchlinkError> {
        self.load_own_posts().await?;

        let mut report = PassReport::default();
        {
            let mut page = self.page.lock();
            let mut graph = self.graph.lock();
            let root = page.root();
            let index = index_subtree(&mut page, self.schema.as_ref(), &mut graph, root);
            report.roots = 1;
            report.links_indexed = index.links_indexed;
            report.edges_added = index.edges_added;
            if self.settings.expansion.show_backlinks {
                report.backlinks_rendered = render_backlinks(
                    &mut page,
                    self.schema.as_ref(),
                    &graph,
                    &index.touched_targets,
                );
            }
            drop(graph);

            let posts = self.page_posts(&page);
            report.posts = posts.len();
            let (highlighted, own_marked) = self.decorate_posts(&mut page, &posts);
            report.highlighted = highlighted;
            report.own_marked = own_marked;
            // Records for UI inserted here are not host mutations.
            page.take_records();
        }

        info!(
            posts = report.posts,
            edges = report.edges_added,
            backlinks = report.backlinks_rendered,
            "Initial scan complete"
        );
        Ok(report)
    }

    /// Apply a host mutation and return the records it produced.
    pub fn mutate<F>(&self, f: F) -> Vec<MutationRecord>
    where
        F: FnOnce(&mut Page),
    {
        let mut page = self.page.lock();
        let stale = page.take_records();
        if !stale.is_empty() {
            debug!(records = stale.len(), "Dropped records from earlier UI updates");
        }
        f(&mut page);
        page.take_records()
    }

    /// Incremental pass over one (possibly coalesced) mutation batch.
    pub async fn process_mutations(&self, records: Vec<MutationRecord>) -> PassReport {
        let mut report = PassReport::default();
        let new_quotes = {
            let mut page = self.page.lock();
            let changes = classify(&page, self.schema.as_ref(), &records);
            if changes.is_empty() {
                debug!(records = records.len(), "Batch has no structural changes");
                return report;
            }
            report.roots = changes.roots.len();
            report.posts = changes.new_posts.len();

            let mut graph = self.graph.lock();
            let mut targets: Vec<String> = Vec::new();
            for &root in &changes.roots {
                let index = index_subtree(&mut page, self.schema.as_ref(), &mut graph, root);
                report.links_indexed += index.links_indexed;
                report.edges_added += index.edges_added;
                for target in index.touched_targets {
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
            }
            // A post arriving after the posts that quote it.
            for &post in &changes.new_posts {
                if let Some(id) = self.schema.extract_post_id(&page, post) {
                    if !graph.backlinks_of(&id).is_empty() && !targets.contains(&id) {
                        targets.push(id);
                    }
                }
            }
            if self.settings.expansion.show_backlinks {
                report.backlinks_rendered =
                    render_backlinks(&mut page, self.schema.as_ref(), &graph, &targets);
            }
            drop(graph);

            let (highlighted, own_marked) = self.decorate_posts(&mut page, &changes.new_posts);
            report.highlighted = highlighted;
            report.own_marked = own_marked;
            changes.new_quotes
        };

        let expansion = &self.settings.expansion;
        if expansion.enabled && expansion.auto_expand && !new_quotes.is_empty() {
            let outcomes = self
                .expansion
                .auto_expand_links(&new_quotes, expansion.max_auto_expand)
                .await;
            report.auto_expanded = outcomes
                .iter()
                .filter(|(_, outcome)| matches!(outcome, Activation::Expanded { .. }))
                .count();
        }

        self.passes.fetch_add(1, Ordering::Relaxed);
        debug!(
            roots = report.roots,
            edges = report.edges_added,
            backlinks = report.backlinks_rendered,
            "Mutation pass complete"
        );
        report
    }

    /// Start a watcher that feeds this context.
    pub fn watch(self: &Arc<Self>) -> MutationWatcher {
        let sink: Arc<dyn MutationSink> = Arc::clone(self) as Arc<dyn MutationSink>;
        MutationWatcher::spawn(sink, self.settings.watcher.queue_capacity)
    }

    pub async fn activate(&self, link: NodeId) -> Result<Activation, ArchlinkError> {
        self.expansion.activate(link).await
    }

    /// Ask the archive who replies to every post on the page.
    ///
    /// Requests are sequential and spaced per host. Posts whose lookup failed
    /// are retried in later passes, at most `discovery.max_passes` in total.
    #[instrument(skip(self), fields(host = %self.location.host))]
    pub async fn discover_remote_backlinks(&self) -> Result<DiscoveryReport, ArchlinkError> {
        let board = self.location.board.clone();
        let delay = self.settings.discovery.delay_for(&self.location.host);
        let max_passes = self.settings.discovery.max_passes.max(1);
        let mut pending = self.post_ids();
        let mut report = DiscoveryReport::default();
        let mut touched: Vec<String> = Vec::new();
        let mut first_request = true;

        while !pending.is_empty() && report.passes < max_passes {
            report.passes += 1;
            let mut failed = Vec::new();
            for id in pending {
                if !first_request {
                    sleep(delay).await;
                }
                first_request = false;
                report.requests += 1;

                match self.client.fetch_replies(&id, &board).await {
                    Ok(replies) => {
                        let mut graph = self.graph.lock();
                        for reply in replies {
                            if graph.insert(&reply, &id) {
                                report.edges_added += 1;
                                if !touched.contains(&id) {
                                    touched.push(id.clone());
                                }
                            }
                        }
                    }
                    Err(e @ FetchError::UnsupportedSite { .. }) => return Err(e.into()),
                    Err(e) => {
                        warn!(post = %id, pass = report.passes, error = %e, "Reply lookup failed");
                        failed.push(id);
                    }
                }
            }
            pending = failed;
        }
        report.failed = pending;

        if self.settings.expansion.show_backlinks && !touched.is_empty() {
            let mut page = self.page.lock();
            let graph = self.graph.lock();
            report.backlinks_rendered =
                render_backlinks(&mut page, self.schema.as_ref(), &graph, &touched);
        }

        if report.failed.is_empty() {
            info!(passes = report.passes, edges = report.edges_added, "Remote backlinks discovered");
        } else {
            warn!(
                passes = report.passes,
                failed = report.failed.len(),
                "Remote backlink discovery gave up on some posts"
            );
        }
        Ok(report)
    }

    /// Refetch the current thread and report post ids missing from the page.
    pub async fn check_for_new_posts(&self) -> Result<Vec<String>, ArchlinkError> {
        let thread_id = self
            .location
            .thread_id
            .clone()
            .ok_or_else(|| ArchlinkError::MissingContext("thread id".to_string()))?;
        let thread = self
            .client
            .refresh_thread(&thread_id, &self.location.board)
            .await?;
        let on_page: HashSet<String> = self.post_ids().into_iter().collect();
        let missing: Vec<String> = thread
            .posts
            .iter()
            .filter(|p| !on_page.contains(&p.id))
            .map(|p| p.id.clone())
            .collect();
        if !missing.is_empty() {
            info!(thread = %thread_id, new = missing.len(), "New posts available");
        }
        Ok(missing)
    }

    /// Record the newest post on the page as seen. `None` without user state,
    /// a thread id or numeric post ids.
    pub async fn mark_seen(&self) -> Result<Option<u64>, ArchlinkError> {
        let (Some(state), Some(thread)) = (&self.user_state, &self.location.thread_id) else {
            return Ok(None);
        };
        let Some(newest) = self
            .post_ids()
            .iter()
            .filter_map(|id| id.parse::<u64>().ok())
            .max()
        else {
            return Ok(None);
        };
        let seen = state.mark_seen(&self.location.board, thread, newest).await?;
        Ok(Some(seen))
    }

    /// Flip the own-post mark of `id` and update the page.
    pub async fn toggle_own_post(&self, id: &str) -> Result<bool, ArchlinkError> {
        let state = self
            .user_state
            .as_ref()
            .ok_or_else(|| ArchlinkError::MissingContext("user state".to_string()))?;
        let key = PostKey::new(self.location.board.clone(), id);
        let marked = state.toggle_own_post(&key).await?;
        {
            let mut own = self.own_posts.lock();
            if marked {
                own.insert(key);
            } else {
                own.remove(&key);
            }
        }

        let mut page = self.page.lock();
        let graph = self.graph.lock();
        if let Some(post) = find_post(&page, self.schema.as_ref(), &graph, id) {
            if marked {
                page.add_class(post, OWN_POST_CLASS);
            } else {
                page.remove_class(post, OWN_POST_CLASS);
            }
        }
        Ok(marked)
    }

    async fn load_own_posts(&self) -> Result<(), ArchlinkError> {
        let Some(state) = &self.user_state else {
            return Ok(());
        };
        let posts = state.own_posts().await?;
        debug!(count = posts.len(), "Loaded own posts");
        *self.own_posts.lock() = posts.into_iter().collect();
        Ok(())
    }

    /// Post elements on the page proper, in document order.
    fn page_posts(&self, page: &Page) -> Vec<NodeId> {
        match Selector::parse(self.schema.post_selector(page)) {
            Ok(selector) => page
                .select(page.root(), &selector)
                .into_iter()
                .filter(|&n| !is_owned_ui(page, n))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Post selector rejected");
                Vec::new()
            }
        }
    }

    fn post_ids(&self) -> Vec<String> {
        let page = self.page.lock();
        self.page_posts(&page)
            .into_iter()
            .filter_map(|n| self.schema.extract_post_id(&page, n))
            .collect()
    }

    /// Highlight keywords and mark own posts. Returns both counts.
    fn decorate_posts(&self, page: &mut Page, posts: &[NodeId]) -> (usize, usize) {
        let own = self.own_posts.lock();
        let mut highlighted = 0;
        let mut own_marked = 0;
        for &post in posts {
            if self.highlighter.is_active() {
                let message = self.schema.message_element(page, post);
                if !self.highlighter.highlight_post(page, post, message).is_empty() {
                    highlighted += 1;
                }
            }
            if own.is_empty() {
                continue;
            }
            if let Some(id) = self.schema.extract_post_id(page, post) {
                if own.contains(&PostKey::new(self.location.board.clone(), id)) {
                    page.add_class(post, OWN_POST_CLASS);
                    own_marked += 1;
                }
            }
        }
        (highlighted, own_marked)
    }
}

#[async_trait]
impl MutationSink for PageContext {
    async fn process(&self, records: Vec<MutationRecord>) {
        self.process_mutations(records).await;
    }
}
