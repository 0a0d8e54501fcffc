//! Subtree scanning for quote links.

use super::QuoteGraph;
use crate::dom::{NodeId, Page, Selector};
use crate::site::SiteSchema;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

/// Set on quote links already folded into the graph.
pub const INDEXED_ATTR: &str = "data-archlink-indexed";

lazy_static! {
    static ref HREF_TARGET: Regex = Regex::new(r"#[pq]?(\d+)$").unwrap();
    static ref HREF_TAIL: Regex = Regex::new(r"/(\d+)/?$").unwrap();
    static ref TEXT_QUOTE: Regex = Regex::new(r">>(?:>/[A-Za-z0-9_]+/)?(\d+)").unwrap();
    static ref TEXT_DIGITS: Regex = Regex::new(r"^\s*(\d+)\s*$").unwrap();
    static ref OWNED_UI: Selector =
        Selector::parse(".archlink-backlinks, .archlink-expansion").unwrap();
}

/// Outcome of one [`index_subtree`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub posts_scanned: usize,
    pub links_indexed: usize,
    pub edges_added: usize,
    pub skipped: usize,
    /// Targets that gained a backlink, in discovery order.
    pub touched_targets: Vec<String>,
}

/// Whether `node` sits inside UI this crate inserted.
pub fn is_owned_ui(page: &Page, node: NodeId) -> bool {
    page.closest(node, &OWNED_UI).is_some()
}

/// Target post id of a quote link: `data-post`, then `#p123`/`#q123`/`#123`
/// or a trailing numeric path segment in `href`, then `>>123` or bare digits
/// in the link text.
pub fn extract_target_id(page: &Page, link: NodeId) -> Option<String> {
    if let Some(id) = page
        .attr(link, "data-post")
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
    {
        return Some(id.to_string());
    }
    if let Some(href) = page.attr(link, "href") {
        if let Some(caps) = HREF_TARGET.captures(href).or_else(|| HREF_TAIL.captures(href)) {
            return Some(caps[1].to_string());
        }
    }
    let text = page.text_content(link);
    TEXT_QUOTE
        .captures(&text)
        .or_else(|| TEXT_DIGITS.captures(&text))
        .map(|caps| caps[1].to_string())
}

/// Fold the quote links under `root` (inclusive) into `graph`.
///
/// Each link is attributed to its closest post ancestor, which may lie above
/// `root`. Malformed elements are logged and skipped without aborting the pass.
/// Links inside owned UI are ignored, and processed links are flagged so
/// overlapping scans never count them twice.
pub fn index_subtree(
    page: &mut Page,
    schema: &dyn SiteSchema,
    graph: &mut QuoteGraph,
    root: NodeId,
) -> IndexReport {
    let mut report = IndexReport::default();
    let post_selector = match Selector::parse(schema.post_selector(page)) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Post selector rejected, nothing indexed");
            return report;
        }
    };
    let quote_selector = match Selector::parse(schema.quote_link_selector(page)) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Quote link selector rejected, nothing indexed");
            return report;
        }
    };

    let mut posts = page.select(root, &post_selector);
    if page.matches(root, &post_selector) {
        posts.insert(0, root);
    }
    for post in posts {
        if is_owned_ui(page, post) {
            continue;
        }
        report.posts_scanned += 1;
        match schema.extract_post_id(page, post) {
            Some(id) => graph.place(&id, post),
            None => debug!(element = post, "Post element without id"),
        }
    }

    let mut links = page.select(root, &quote_selector);
    if page.matches(root, &quote_selector) {
        links.insert(0, root);
    }
    for link in links {
        if page.attr(link, INDEXED_ATTR).is_some() || is_owned_ui(page, link) {
            continue;
        }
        let Some(source) = page
            .closest(link, &post_selector)
            .and_then(|post| schema.extract_post_id(page, post))
        else {
            warn!(element = link, "Quote link outside an identifiable post");
            report.skipped += 1;
            continue;
        };
        let Some(target) = extract_target_id(page, link) else {
            warn!(element = link, source = %source, "Quote link without target id");
            report.skipped += 1;
            continue;
        };

        report.links_indexed += 1;
        if graph.insert(&source, &target) {
            report.edges_added += 1;
            if !report.touched_targets.contains(&target) {
                report.touched_targets.push(target);
            }
        }
        page.set_attr(link, INDEXED_ATTR, "true");
    }

    debug!(
        root,
        posts = report.posts_scanned,
        links = report.links_indexed,
        edges = report.edges_added,
        skipped = report.skipped,
        "Indexed subtree"
    );
    report
}
