//! The "Replies:" affordance rendered on quoted posts.

use super::indexer::is_owned_ui;
use super::QuoteGraph;
use crate::dom::{NodeId, Page, Selector};
use crate::expand::EXPANSION_CLASS;
use crate::site::SiteSchema;
use tracing::debug;

pub const BACKLINKS_CLASS: &str = "archlink-backlinks";
pub const BACKLINK_CLASS: &str = "backlink";
pub const BACKLINKS_TITLE: &str = "Replies:";

/// Locate the page element of post `id`, skipping copies inside owned UI.
///
/// Every post on the page is placed by the indexer, so an id without a
/// placement is not on the page. The page is only searched when the host
/// replaced a placed element since it was indexed.
pub(crate) fn find_post(
    page: &Page,
    schema: &dyn SiteSchema,
    graph: &QuoteGraph,
    id: &str,
) -> Option<NodeId> {
    let node = graph.placement(id)?;
    if page.is_attached(node)
        && !is_owned_ui(page, node)
        && schema.extract_post_id(page, node).as_deref() == Some(id)
    {
        return Some(node);
    }
    let selector = Selector::parse(schema.post_selector(page)).ok()?;
    page.select(page.root(), &selector)
        .into_iter()
        .filter(|&n| !is_owned_ui(page, n))
        .find(|&n| schema.extract_post_id(page, n).as_deref() == Some(id))
}

/// The post's own backlink container, ignoring ones inside nested expansions.
fn own_container(page: &Page, post: NodeId) -> Option<NodeId> {
    page.descendants(post)
        .into_iter()
        .find(|&n| page.has_class(n, BACKLINKS_CLASS) && !nested_in_expansion(page, n, post))
}

fn nested_in_expansion(page: &Page, node: NodeId, post: NodeId) -> bool {
    let mut cur = page.parent(node);
    while let Some(n) = cur {
        if n == post {
            return false;
        }
        if page.has_class(n, EXPANSION_CLASS) {
            return true;
        }
        cur = page.parent(n);
    }
    false
}

fn create_container(page: &mut Page, schema: &dyn SiteSchema, post: NodeId) -> NodeId {
    let container = page.create_element("div");
    page.set_attr(container, "class", BACKLINKS_CLASS);
    let title = page.create_element("span");
    page.set_attr(title, "class", "archlink-backlinks-title");
    let text = page.create_text(BACKLINKS_TITLE);
    page.append_child(title, text);
    page.append_child(container, title);

    match schema
        .message_element(page, post)
        .filter(|&m| page.parent(m).is_some())
    {
        Some(message) => page.insert_before(message, container),
        None => page.append_child(post, container),
    }
    container
}

fn listed(page: &Page, container: NodeId, source: &str) -> bool {
    page.element_children(container).into_iter().any(|c| {
        page.has_class(c, BACKLINK_CLASS) && page.attr(c, "data-post-id") == Some(source)
    })
}

/// Create or update the backlink block of every target present on the page.
///
/// The block is created once per post, before the message element when there
/// is one, and a source is appended only when no entry with the same
/// `data-post-id` exists. Returns the number of entries added.
pub fn render_backlinks(
    page: &mut Page,
    schema: &dyn SiteSchema,
    graph: &QuoteGraph,
    targets: &[String],
) -> usize {
    let mut added = 0;
    for target in targets {
        let sources = graph.backlinks_of(target);
        if sources.is_empty() {
            continue;
        }
        let Some(post) = find_post(page, schema, graph, target) else {
            debug!(target = %target, "Quoted post not on page");
            continue;
        };
        let container = match own_container(page, post) {
            Some(c) => c,
            None => create_container(page, schema, post),
        };
        for source in sources {
            if listed(page, container, source) {
                continue;
            }
            let link = page.create_element("a");
            page.set_attr(link, "class", BACKLINK_CLASS);
            page.set_attr(link, "href", &format!("#p{}", source));
            page.set_attr(link, "data-post-id", source);
            let label = page.create_text(&format!(">>{}", source));
            page.append_child(link, label);
            page.append_child(container, link);
            added += 1;
        }
    }
    if added > 0 {
        debug!(added, "Rendered backlinks");
    }
    added
}
