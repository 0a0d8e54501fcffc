//! HTML import via `scraper` and serialization back to markup.

use super::{NodeData, NodeId, Page};
use scraper::{ElementRef, Html, Node};

/// Elements removed from archive-supplied markup.
const DROPPED_TAGS: &[&str] = &["script", "style", "iframe", "object", "embed", "noscript"];

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

const RAW_TEXT_TAGS: &[&str] = &["script", "style"];

pub(super) fn import_document(page: &mut Page, markup: &str) {
    let document = Html::parse_document(markup);
    if let Some(node) = import_element(page, document.root_element(), false) {
        let root = page.root();
        page.link_child(root, node, None);
    }
}

/// Parse `markup` as a fragment; returned nodes are detached.
pub(super) fn import_fragment(page: &mut Page, markup: &str, sanitize: bool) -> Vec<NodeId> {
    let fragment = Html::parse_fragment(markup);
    let mut out = Vec::new();
    for child in fragment.root_element().children() {
        let imported = match child.value() {
            Node::Text(text) => Some(page.create_text(text)),
            Node::Element(_) => {
                ElementRef::wrap(child).and_then(|el| import_element(page, el, sanitize))
            }
            _ => None,
        };
        out.extend(imported);
    }
    out
}

fn import_element(page: &mut Page, el: ElementRef<'_>, sanitize: bool) -> Option<NodeId> {
    let tag = el.value().name();
    if sanitize && DROPPED_TAGS.contains(&tag) {
        return None;
    }
    let node = page.create_element(tag);
    for (name, value) in el.value().attrs() {
        if sanitize && !attribute_allowed(name, value) {
            continue;
        }
        page.set_attr_silent(node, name, value);
    }
    for child in el.children() {
        let imported = match child.value() {
            Node::Text(text) => Some(page.create_text(text)),
            Node::Element(_) => {
                ElementRef::wrap(child).and_then(|el| import_element(page, el, sanitize))
            }
            _ => None,
        };
        if let Some(c) = imported {
            page.link_child(node, c, None);
        }
    }
    Some(node)
}

fn attribute_allowed(name: &str, value: &str) -> bool {
    let name = name.to_ascii_lowercase();
    if name.starts_with("on") {
        return false;
    }
    if matches!(name.as_str(), "href" | "src" | "action" | "formaction") {
        let v = value.trim().to_ascii_lowercase();
        return !(v.starts_with("javascript:") || v.starts_with("vbscript:"));
    }
    true
}

pub(super) fn serialize_node(page: &Page, node: NodeId, out: &mut String) {
    match page.data(node) {
        Some(NodeData::Text(text)) => {
            let raw = page
                .parent(node)
                .and_then(|p| page.tag(p))
                .map(|t| RAW_TEXT_TAGS.contains(&t))
                .unwrap_or(false);
            if raw {
                out.push_str(text);
            } else {
                escape_into(text, false, out);
            }
        }
        Some(NodeData::Element(el)) => {
            out.push('<');
            out.push_str(&el.tag);
            for (k, v) in &el.attrs {
                out.push(' ');
                out.push_str(k);
                out.push_str("=\"");
                escape_into(v, true, out);
                out.push('"');
            }
            out.push('>');
            if VOID_TAGS.contains(&el.tag.as_str()) {
                return;
            }
            for &child in page.children(node) {
                serialize_node(page, child, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
        None => {}
    }
}

fn escape_into(s: &str, attribute: bool, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

/// Escape text for interpolation into markup.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Strip active content from an archive-supplied fragment.
///
/// Drops script-like elements, `on*` handlers and `javascript:` URLs.
pub fn sanitize_html(markup: &str) -> String {
    let mut page = Page::new();
    let nodes = import_fragment(&mut page, markup, true);
    let mut out = String::new();
    for node in nodes {
        serialize_node(&page, node, &mut out);
    }
    out
}
