//! Mutable page model.
//!
//! Nodes live in a flat arena and are linked by index. [`Page::remove`] only
//! detaches, so the [`NodeId`] stays valid. [`Page::discard`] returns a whole
//! subtree's slots to a free list; those ids are reused by later allocations.
//! Structural and attribute changes on attached nodes are recorded as
//! [`MutationRecord`]s, drained with [`Page::take_records`].

mod html;
mod selector;

pub use html::{escape_html, sanitize_html};
pub use selector::Selector;

use crate::error::SelectorError;
use std::collections::HashMap;
use tracing::warn;

/// Index into a [`Page`]'s node arena.
pub type NodeId = usize;

const ROOT_TAG: &str = "#root";

#[derive(Debug, Clone)]
pub enum NodeData {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct ElementData {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// What changed in a mutation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

/// One observed change to an attached node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub attribute: Option<String>,
}

impl MutationRecord {
    fn child_list(target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            added,
            removed,
            attribute: None,
        }
    }
}

/// An HTML page held as a node arena.
#[derive(Debug, Clone)]
pub struct Page {
    nodes: Vec<Node>,
    root: NodeId,
    ids: HashMap<String, Vec<NodeId>>,
    records: Vec<MutationRecord>,
    free: Vec<NodeId>,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    /// Empty page holding only the synthetic root.
    pub fn new() -> Self {
        let root = Node {
            data: NodeData::Element(ElementData {
                tag: ROOT_TAG.to_string(),
                attrs: Vec::new(),
            }),
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![root],
            root: 0,
            ids: HashMap::new(),
            records: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Parse a full HTML document.
    pub fn parse(markup: &str) -> Self {
        let mut page = Self::new();
        html::import_document(&mut page, markup);
        page.records.clear();
        page
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The `<body>` element, falling back to the root.
    pub fn body(&self) -> NodeId {
        self.descendants(self.root)
            .into_iter()
            .find(|&n| self.tag(n) == Some("body"))
            .unwrap_or(self.root)
    }

    /// Arena slots in use, including detached nodes.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Arena slots ever allocated.
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[self.root].children.is_empty()
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn data(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(node).map(|n| &n.data)
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        node != self.root && matches!(self.data(node), Some(NodeData::Element(_)))
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match self.data(node)? {
            NodeData::Element(el) if node != self.root => Some(el.tag.as_str()),
            _ => None,
        }
    }

    /// Contents of a text node.
    pub fn text(&self, node: NodeId) -> Option<&str> {
        match self.data(node)? {
            NodeData::Text(t) => Some(t.as_str()),
            NodeData::Element(_) => None,
        }
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match self.data(node)? {
            NodeData::Element(el) => el
                .attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            NodeData::Text(_) => None,
        }
    }

    pub fn attrs(&self, node: NodeId) -> &[(String, String)] {
        match self.data(node) {
            Some(NodeData::Element(el)) => &el.attrs,
            _ => &[],
        }
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .map(|c| c.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).and_then(|n| n.parent)
    }

    /// Parent element, never the synthetic root.
    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|&p| p != self.root)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .iter()
            .copied()
            .filter(|&c| self.is_element(c))
            .collect()
    }

    pub fn next_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&s| s == node)?;
        siblings[pos + 1..]
            .iter()
            .copied()
            .find(|&s| self.is_element(s))
    }

    /// All descendants of `node` in document order, excluding `node`.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    /// Whether the node is connected to the page root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        self.contains(self.root, node)
    }

    /// First attached element carrying `id="<value>"`.
    pub fn find_by_id(&self, value: &str) -> Option<NodeId> {
        self.ids
            .get(value)?
            .iter()
            .copied()
            .find(|&n| self.attr(n, "id") == Some(value) && self.is_attached(n))
    }

    pub fn text_content(&self, node: NodeId) -> String {
        if let Some(t) = self.text(node) {
            return t.to_string();
        }
        self.descendants(node)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(node) {
            html::serialize_node(self, child, &mut out);
        }
        out
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        if node == self.root {
            return self.inner_html(node);
        }
        let mut out = String::new();
        html::serialize_node(self, node, &mut out);
        out
    }

    /// Serialize the whole page.
    pub fn to_html(&self) -> String {
        self.inner_html(self.root)
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Descendant elements of `scope` matching `selector`, in document order.
    pub fn select(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|&n| selector.matches(self, n))
            .collect()
    }

    pub fn select_first(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|&n| selector.matches(self, n))
    }

    /// Parse `css` and select with it.
    pub fn query(&self, scope: NodeId, css: &str) -> Result<Vec<NodeId>, SelectorError> {
        Ok(self.select(scope, &Selector::parse(css)?))
    }

    pub fn query_first(&self, scope: NodeId, css: &str) -> Result<Option<NodeId>, SelectorError> {
        Ok(self.select_first(scope, &Selector::parse(css)?))
    }

    pub fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        selector.matches(self, node)
    }

    /// Nearest inclusive ancestor matching `selector`.
    pub fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if selector.matches(self, n) {
                return Some(n);
            }
            cur = self.parent_element(n);
        }
        None
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// New detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(NodeData::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        }))
    }

    /// New detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeData::Text(text.to_string()))
    }

    fn push_node(&mut self, data: NodeData) -> NodeId {
        let node = Node {
            data,
            parent: None,
            children: Vec::new(),
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id] = node;
            return id;
        }
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Parse an HTML fragment into detached nodes.
    pub fn parse_fragment(&mut self, markup: &str) -> Vec<NodeId> {
        html::import_fragment(self, markup, false)
    }

    /// Deep copy of `node`, detached.
    pub fn clone_subtree(&mut self, node: NodeId) -> NodeId {
        let copy = match self.data(node).cloned() {
            Some(NodeData::Element(el)) if node != self.root => {
                let copy = self.create_element(&el.tag);
                for (k, v) in &el.attrs {
                    self.set_attr_silent(copy, k, v);
                }
                copy
            }
            Some(NodeData::Text(t)) => self.create_text(&t),
            _ => self.create_element("div"),
        };
        let children = self.children(node).to_vec();
        for child in children {
            let c = self.clone_subtree(child);
            self.link_child(copy, c, None);
        }
        copy
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_child(parent, child, None);
    }

    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) {
        let Some(parent) = self.parent(reference) else {
            warn!(reference, "insert_before on a node without parent");
            return;
        };
        self.detach(node);
        let index = self.children(parent).iter().position(|&c| c == reference);
        self.insert_child(parent, node, index);
    }

    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) {
        let Some(parent) = self.parent(reference) else {
            warn!(reference, "insert_after on a node without parent");
            return;
        };
        self.detach(node);
        let index = self
            .children(parent)
            .iter()
            .position(|&c| c == reference)
            .map(|i| i + 1);
        self.insert_child(parent, node, index);
    }

    /// Detach `node` from its parent.
    pub fn remove(&mut self, node: NodeId) {
        self.detach(node);
    }

    /// Detach `node` and free its whole subtree. Returns the freed ids, which
    /// must not be used afterwards.
    pub fn discard(&mut self, node: NodeId) -> Vec<NodeId> {
        if node == self.root || node >= self.nodes.len() || self.free.contains(&node) {
            return Vec::new();
        }
        self.detach(node);
        let mut freed = vec![node];
        freed.extend(self.descendants(node));
        for &n in &freed {
            if let Some(id) = self.attr(n, "id").map(str::to_string) {
                if let Some(entry) = self.ids.get_mut(&id) {
                    entry.retain(|&e| e != n);
                }
            }
            self.nodes[n] = Node {
                data: NodeData::Text(String::new()),
                parent: None,
                children: Vec::new(),
            };
        }
        self.free.extend(freed.iter().rev());
        freed
    }

    pub fn replace_with(&mut self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        let Some(parent) = self.parent(old) else {
            return;
        };
        self.detach(new);
        let Some(index) = self.children(parent).iter().position(|&c| c == old) else {
            return;
        };
        self.nodes[parent].children[index] = new;
        self.nodes[new].parent = Some(parent);
        self.nodes[old].parent = None;
        if self.is_attached(parent) {
            self.records
                .push(MutationRecord::child_list(parent, vec![new], vec![old]));
        }
    }

    /// Parse `markup` and append the resulting nodes to `parent`.
    pub fn append_html(&mut self, parent: NodeId, markup: &str) -> Vec<NodeId> {
        let nodes = self.parse_fragment(markup);
        for &n in &nodes {
            self.append_child(parent, n);
        }
        nodes
    }

    /// Replace the children of `parent` with parsed `markup`.
    pub fn set_inner_html(&mut self, parent: NodeId, markup: &str) -> Vec<NodeId> {
        let old = self.children(parent).to_vec();
        for n in old {
            self.detach(n);
        }
        self.append_html(parent, markup)
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        if let Some(Node {
            data: NodeData::Text(t),
            ..
        }) = self.nodes.get_mut(node)
        {
            *t = text.to_string();
            if self.is_attached(node) {
                self.records.push(MutationRecord {
                    kind: MutationKind::CharacterData,
                    target: node,
                    added: Vec::new(),
                    removed: Vec::new(),
                    attribute: None,
                });
            }
        }
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        if self.set_attr_silent(node, name, value) && self.is_attached(node) {
            self.records.push(MutationRecord {
                kind: MutationKind::Attributes,
                target: node,
                added: Vec::new(),
                removed: Vec::new(),
                attribute: Some(name.to_string()),
            });
        }
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        let removed = match self.nodes.get_mut(node) {
            Some(Node {
                data: NodeData::Element(el),
                ..
            }) => {
                let before = el.attrs.len();
                el.attrs.retain(|(k, _)| k != name);
                before != el.attrs.len()
            }
            _ => false,
        };
        if removed && self.is_attached(node) {
            self.records.push(MutationRecord {
                kind: MutationKind::Attributes,
                target: node,
                added: Vec::new(),
                removed: Vec::new(),
                attribute: Some(name.to_string()),
            });
        }
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if self.has_class(node, class) {
            return;
        }
        let value = match self.attr(node, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        self.set_attr(node, "class", &value);
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        if !self.has_class(node, class) {
            return;
        }
        let value: Vec<&str> = self
            .attr(node, "class")
            .unwrap_or_default()
            .split_whitespace()
            .filter(|c| *c != class)
            .collect();
        let value = value.join(" ");
        self.set_attr(node, "class", &value);
    }

    /// Drain pending mutation records.
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn pending_records(&self) -> usize {
        self.records.len()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Returns whether the attribute value changed.
    fn set_attr_silent(&mut self, node: NodeId, name: &str, value: &str) -> bool {
        let Some(Node {
            data: NodeData::Element(el),
            ..
        }) = self.nodes.get_mut(node)
        else {
            return false;
        };
        let name = name.to_ascii_lowercase();
        match el.attrs.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) if v == value => return false,
            Some((_, v)) => *v = value.to_string(),
            None => el.attrs.push((name.clone(), value.to_string())),
        }
        if name == "id" {
            let entry = self.ids.entry(value.to_string()).or_default();
            if !entry.contains(&node) {
                entry.push(node);
            }
        }
        true
    }

    fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        self.nodes[parent].children.retain(|&c| c != node);
        self.nodes[node].parent = None;
        if self.is_attached(parent) {
            self.records
                .push(MutationRecord::child_list(parent, Vec::new(), vec![node]));
        }
    }

    fn insert_child(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) {
        if self.contains(child, parent) {
            warn!(parent, child, "refusing to insert a node into its own subtree");
            return;
        }
        if self.text(parent).is_some() {
            warn!(parent, "text nodes cannot have children");
            return;
        }
        self.detach(child);
        self.link_child(parent, child, index);
        if self.is_attached(parent) {
            self.records
                .push(MutationRecord::child_list(parent, vec![child], Vec::new()));
        }
    }

    fn link_child(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) {
        let children = &mut self.nodes[parent].children;
        let index = index.unwrap_or(children.len()).min(children.len());
        children.insert(index, child);
        self.nodes[child].parent = Some(parent);
    }
}
