//! Quote Graph
//!
//! Bidirectional index of quote links on a page. The forward map answers "what
//! does this post quote", the backlink map answers "who quotes this post" and is
//! read on every backlink render. Edges are a set: inserting the same pair twice
//! changes nothing. Entries are never removed while the page lives.

use crate::dom::NodeId;
use std::collections::{HashMap, HashSet};

mod backlinks;
mod indexer;

pub(crate) use backlinks::find_post;
pub use backlinks::{render_backlinks, BACKLINK_CLASS, BACKLINKS_CLASS, BACKLINKS_TITLE};
pub use indexer::{extract_target_id, index_subtree, is_owned_ui, IndexReport, INDEXED_ATTR};

/// Who-quotes-whom for one page.
#[derive(Debug, Clone, Default)]
pub struct QuoteGraph {
    forward: HashMap<String, Vec<String>>,
    backlinks: HashMap<String, Vec<String>>,
    edges: HashSet<(String, String)>,
    /// Page element of each indexed post.
    placements: HashMap<String, NodeId>,
}

impl QuoteGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `source` quotes `target`. Returns `false` for a known edge.
    pub fn insert(&mut self, source: &str, target: &str) -> bool {
        if !self
            .edges
            .insert((source.to_string(), target.to_string()))
        {
            return false;
        }
        self.forward
            .entry(source.to_string())
            .or_default()
            .push(target.to_string());
        self.backlinks
            .entry(target.to_string())
            .or_default()
            .push(source.to_string());
        true
    }

    pub fn contains(&self, source: &str, target: &str) -> bool {
        self.edges
            .contains(&(source.to_string(), target.to_string()))
    }

    /// Posts quoting `target`, in discovery order.
    pub fn backlinks_of(&self, target: &str) -> &[String] {
        self.backlinks
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Posts quoted by `source`, in discovery order.
    pub fn quotes_of(&self, source: &str) -> &[String] {
        self.forward.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Ids with at least one backlink.
    pub fn quoted_posts(&self) -> impl Iterator<Item = &str> {
        self.backlinks.keys().map(String::as_str)
    }

    pub fn place(&mut self, id: &str, element: NodeId) {
        self.placements.insert(id.to_string(), element);
    }

    /// Last known element for post `id`. May be stale if the host removed it.
    pub fn placement(&self, id: &str) -> Option<NodeId> {
        self.placements.get(id).copied()
    }

    pub fn placed_posts(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.placements.iter().map(|(id, &n)| (id.as_str(), n))
    }
}
