//! Expansion Controller
//!
//! Inline expansion of quoted posts. Each quote link moves through
//! `Collapsed -> Loading -> Expanded | Error` and back to `Collapsed` when
//! activated again. A target is resolved from the page itself, then the cache,
//! then the network. Every network round trip carries a generation tag; a
//! response whose link has since been reset is discarded.

use crate::config::ExpansionSettings;
use crate::dom::{NodeId, Page, Selector};
use crate::error::ArchlinkError;
use crate::fetch::ArchiveClient;
use crate::graph::{extract_target_id, find_post, is_owned_ui, QuoteGraph};
use crate::model::PostKey;
use crate::render::render_cached;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const EXPANSION_CLASS: &str = "archlink-expansion";
pub const LOADING_CLASS: &str = "archlink-loading";
pub const ERROR_CLASS: &str = "archlink-error";
pub const DISMISS_CLASS: &str = "archlink-dismiss";
pub const CLONE_CLASS: &str = "archlink-clone";
/// Links an expansion container back to the quote link that opened it.
pub const LINK_ATTR: &str = "data-archlink-link";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpansionState {
    #[default]
    Collapsed,
    Loading,
    Expanded,
    Error,
}

/// Where expanded content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionSource {
    Page,
    Cache,
    Network,
}

/// Result of activating a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// An open expansion or error below the link was removed.
    Collapsed,
    Expanded { source: ExpansionSource },
    /// A resolution for this link is already in flight.
    AlreadyLoading,
    /// The fetch failed; an inline error block was rendered.
    Failed { reason: String },
    /// The response arrived after the link was reset.
    Discarded,
    /// The link sits too deep inside nested expansions.
    DepthLimited,
    Disabled,
}

#[derive(Debug, Clone, Copy, Default)]
struct LinkSlot {
    state: ExpansionState,
    generation: u64,
    container: Option<NodeId>,
}

/// Per-page expansion state. Locks are never held across an `.await`.
pub struct ExpansionController {
    page: Arc<Mutex<Page>>,
    graph: Arc<Mutex<QuoteGraph>>,
    client: Arc<ArchiveClient>,
    settings: ExpansionSettings,
    links: Mutex<HashMap<NodeId, LinkSlot>>,
    /// Generations are unique per controller so a reused node id never
    /// matches an older round trip.
    generations: AtomicU64,
}

/// What an activation resolved to before any network round trip.
enum Plan {
    Done(Activation),
    Fetch {
        key: PostKey,
        generation: u64,
        container: NodeId,
    },
}

impl ExpansionController {
    pub fn new(
        page: Arc<Mutex<Page>>,
        graph: Arc<Mutex<QuoteGraph>>,
        client: Arc<ArchiveClient>,
        settings: ExpansionSettings,
    ) -> Self {
        Self {
            page,
            graph,
            client,
            settings,
            links: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn settings(&self) -> &ExpansionSettings {
        &self.settings
    }

    pub fn state(&self, link: NodeId) -> ExpansionState {
        self.links
            .lock()
            .get(&link)
            .map(|s| s.state)
            .unwrap_or_default()
    }

    /// Open container below `link`, if any.
    pub fn container(&self, link: NodeId) -> Option<NodeId> {
        self.links.lock().get(&link).and_then(|s| s.container)
    }

    /// Activate a quote link (or backlink).
    pub async fn activate(&self, link: NodeId) -> Result<Activation, ArchlinkError> {
        if !self.settings.enabled {
            return Ok(Activation::Disabled);
        }
        let (key, generation, container) = match self.plan(link)? {
            Plan::Done(outcome) => return Ok(outcome),
            Plan::Fetch {
                key,
                generation,
                container,
            } => (key, generation, container),
        };

        debug!(post = %key, link, generation, "Fetching quoted post");
        let result = self.client.fetch_post(&key.id, &key.board).await;

        let mut page = self.page.lock();
        let mut links = self.links.lock();
        let Some(slot) = links
            .get_mut(&link)
            .filter(|s| s.generation == generation && s.state == ExpansionState::Loading)
        else {
            // Whoever reset the link already discarded the container.
            debug!(post = %key, link, "Discarding stale response");
            return Ok(Activation::Discarded);
        };

        match result {
            Ok(post) => {
                let html = render_cached(self.client.cache(), &post);
                page.remove_class(container, LOADING_CLASS);
                for child in page.children(container).to_vec() {
                    page.discard(child);
                }
                page.set_inner_html(container, &html);
                slot.state = ExpansionState::Expanded;
                info!(post = %key, "Expanded from network");
                Ok(Activation::Expanded {
                    source: ExpansionSource::Network,
                })
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(post = %key, error = %reason, "Expansion failed");
                render_error(&mut page, container, &reason);
                slot.state = ExpansionState::Error;
                Ok(Activation::Failed { reason })
            }
        }
    }

    /// Synchronous part of an activation, under the page and state locks.
    fn plan(&self, link: NodeId) -> Result<Plan, ArchlinkError> {
        let mut page = self.page.lock();
        if !page.is_element(link) || !page.is_attached(link) {
            return Err(ArchlinkError::NotQuoteLink(link));
        }
        let target = extract_target_id(&page, link).ok_or(ArchlinkError::NotQuoteLink(link))?;

        let mut links = self.links.lock();
        let slot = links.entry(link).or_default();

        if slot.state == ExpansionState::Loading {
            return Ok(Plan::Done(Activation::AlreadyLoading));
        }

        if let Some(open) = page
            .next_element_sibling(link)
            .filter(|&n| page.has_class(n, EXPANSION_CLASS))
            .filter(|&n| page.attr(n, LINK_ATTR) == Some(link.to_string().as_str()))
        {
            slot.state = ExpansionState::Collapsed;
            slot.container = None;
            slot.generation = self.next_generation();
            let freed = page.discard(open);
            forget(&mut links, &freed);
            debug!(link, target = %target, freed = freed.len(), "Collapsed expansion");
            return Ok(Plan::Done(Activation::Collapsed));
        }

        let depth = expansion_depth(&page, link);
        if depth >= self.settings.max_depth {
            debug!(link, depth, "Expansion depth limit reached");
            return Ok(Plan::Done(Activation::DepthLimited));
        }

        let board = link_board(&page, link, &self.client.location().board);
        let container = create_container(&mut page, link, &target);
        slot.generation = self.next_generation();
        slot.container = Some(container);

        let on_page = {
            let graph = self.graph.lock();
            find_post(&page, self.client.schema().as_ref(), &graph, &target)
        };
        if let Some(original) = on_page {
            let copy = clone_for_expansion(&mut page, original, &target);
            page.append_child(container, copy);
            page.insert_after(link, container);
            slot.state = ExpansionState::Expanded;
            debug!(link, target = %target, "Expanded from page");
            return Ok(Plan::Done(Activation::Expanded {
                source: ExpansionSource::Page,
            }));
        }

        let key = PostKey::new(board, target);
        if let Some(post) = self.client.cache().get_post(&key) {
            let html = render_cached(self.client.cache(), &post);
            page.append_html(container, &html);
            page.insert_after(link, container);
            slot.state = ExpansionState::Expanded;
            debug!(link, post = %key, "Expanded from cache");
            return Ok(Plan::Done(Activation::Expanded {
                source: ExpansionSource::Cache,
            }));
        }

        page.add_class(container, LOADING_CLASS);
        let placeholder = page.create_text("Loading...");
        page.append_child(container, placeholder);
        page.insert_after(link, container);
        slot.state = ExpansionState::Loading;
        Ok(Plan::Fetch {
            key,
            generation: slot.generation,
            container,
        })
    }

    /// Remove an expansion or error block and reset its link.
    pub fn dismiss(&self, container: NodeId) -> bool {
        let mut page = self.page.lock();
        if !page.has_class(container, EXPANSION_CLASS) {
            return false;
        }
        let link = page.attr(container, LINK_ATTR).and_then(|v| v.parse::<NodeId>().ok());
        let freed = page.discard(container);
        let mut links = self.links.lock();
        forget(&mut links, &freed);
        if let Some(link) = link {
            if let Some(slot) = links.get_mut(&link) {
                if slot.container == Some(container) {
                    slot.state = ExpansionState::Collapsed;
                    slot.container = None;
                    slot.generation = self.next_generation();
                }
            }
        }
        true
    }

    /// Expand up to `limit` quote links whose targets are not on the page.
    pub async fn auto_expand(&self, limit: usize) -> Vec<(NodeId, Activation)> {
        let candidates = self.auto_expand_candidates(None, limit);
        self.activate_all(candidates).await
    }

    /// Like [`auto_expand`](Self::auto_expand), restricted to `links`.
    pub async fn auto_expand_links(
        &self,
        links: &[NodeId],
        limit: usize,
    ) -> Vec<(NodeId, Activation)> {
        let candidates = self.auto_expand_candidates(Some(links), limit);
        self.activate_all(candidates).await
    }

    async fn activate_all(&self, links: Vec<NodeId>) -> Vec<(NodeId, Activation)> {
        let mut outcomes = Vec::with_capacity(links.len());
        for link in links {
            match self.activate(link).await {
                Ok(outcome) => outcomes.push((link, outcome)),
                Err(e) => warn!(link, error = %e, "Auto-expansion skipped link"),
            }
        }
        outcomes
    }

    fn auto_expand_candidates(&self, scope: Option<&[NodeId]>, limit: usize) -> Vec<NodeId> {
        let page = self.page.lock();
        let graph = self.graph.lock();
        let links = self.links.lock();
        let schema = self.client.schema();
        let Ok(selector) = Selector::parse(schema.quote_link_selector(&page)) else {
            return Vec::new();
        };
        let pool: Vec<NodeId> = match scope {
            Some(scope) => scope
                .iter()
                .copied()
                .filter(|&l| page.is_attached(l) && page.matches(l, &selector))
                .collect(),
            None => page.select(page.root(), &selector),
        };
        pool.into_iter()
            .filter(|&l| !is_owned_ui(&page, l))
            .filter(|l| {
                links
                    .get(l)
                    .map_or(true, |s| s.state == ExpansionState::Collapsed)
            })
            .filter(|&l| {
                extract_target_id(&page, l)
                    .map_or(false, |t| find_post(&page, schema.as_ref(), &graph, &t).is_none())
            })
            .take(limit)
            .collect()
    }
}

/// Drop state kept for nodes that were freed with their container.
fn forget(links: &mut HashMap<NodeId, LinkSlot>, freed: &[NodeId]) {
    for node in freed {
        links.remove(node);
    }
}

/// Number of expansion containers enclosing `node`.
pub fn expansion_depth(page: &Page, node: NodeId) -> usize {
    let mut depth = 0;
    let mut cur = page.parent_element(node);
    while let Some(n) = cur {
        if page.has_class(n, EXPANSION_CLASS) {
            depth += 1;
        }
        cur = page.parent_element(n);
    }
    depth
}

/// Board of the nearest `data-board` ancestor, else `default`.
fn link_board(page: &Page, link: NodeId, default: &str) -> String {
    let mut cur = Some(link);
    while let Some(n) = cur {
        if let Some(board) = page.attr(n, "data-board").filter(|b| !b.is_empty()) {
            return board.to_string();
        }
        cur = page.parent_element(n);
    }
    default.to_string()
}

fn create_container(page: &mut Page, link: NodeId, target: &str) -> NodeId {
    let container = page.create_element("div");
    page.set_attr(container, "class", EXPANSION_CLASS);
    page.set_attr(container, LINK_ATTR, &link.to_string());
    page.set_attr(container, "data-post-id", target);
    container
}

/// Copy of a page post safe to insert elsewhere: no element ids, no nested
/// expansions, the post id kept as `data-post-id`.
fn clone_for_expansion(page: &mut Page, original: NodeId, target: &str) -> NodeId {
    let copy = page.clone_subtree(original);
    let nodes: Vec<NodeId> = std::iter::once(copy)
        .chain(page.descendants(copy))
        .collect();
    let nested: Vec<NodeId> = nodes
        .iter()
        .copied()
        .filter(|&n| n != copy && page.has_class(n, EXPANSION_CLASS))
        .collect();
    for n in nested {
        page.discard(n);
    }
    for n in nodes {
        if page.attr(n, "id").is_some() {
            page.remove_attr(n, "id");
        }
    }
    page.set_attr(copy, "data-post-id", target);
    page.add_class(copy, CLONE_CLASS);
    copy
}

fn render_error(page: &mut Page, container: NodeId, reason: &str) {
    page.remove_class(container, LOADING_CLASS);
    page.add_class(container, ERROR_CLASS);
    let children = page.children(container).to_vec();
    for child in children {
        page.discard(child);
    }
    let message = page.create_element("span");
    page.set_attr(message, "class", "archlink-error-message");
    let text = page.create_text(&format!("Error: {}", reason));
    page.append_child(message, text);
    page.append_child(container, message);

    let dismiss = page.create_element("a");
    page.set_attr(dismiss, "class", DISMISS_CLASS);
    page.set_attr(dismiss, "href", "#");
    let label = page.create_text("[x]");
    page.append_child(dismiss, label);
    page.append_child(container, dismiss);
}
