//! Fallback schema that detects common archive markup at call time.

use super::families::{locate, post_id_from};
use super::SiteSchema;
use crate::dom::{NodeId, Page};
use crate::model::SourceFamily;

const POST_CANDIDATES: &[&str] = &[".post", ".postContainer", ".post-container", "[id^=\"p\"]"];

const QUOTE_CANDIDATES: &[&str] = &[".quotelink", ".postlink", ".posterquote", "a[href*=\"#p\"]"];

const MESSAGE_CANDIDATES: &[&str] = &[
    ".text",
    ".post_body",
    ".postMessage",
    ".post-message",
    ".body",
    ".message",
    ".postbody",
];

const MEDIA_CANDIDATES: &[&str] = &[
    ".img-container img",
    ".post_file_image img",
    ".fileThumb img",
    ".post_file img",
    ".post_image",
    ".post-image",
    "img.post-image",
];

const AUTHOR_CANDIDATES: &[&str] = &[
    ".name",
    ".post_author",
    ".postername",
    ".author",
    ".nameBlock .name",
    ".post_author_name",
];

const ID_ATTRS: &[&str] = &["data-post-id", "data-id", "data-post"];

/// Wildcard schema. Every selector getter returns the first candidate present
/// in the page; there is no API, so every URL builder returns `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericSchema;

impl GenericSchema {
    fn first_present(page: &Page, candidates: &[&'static str], fallback: &'static str) -> &'static str {
        candidates
            .iter()
            .copied()
            .find(|css| locate(page, page.root(), css).is_some())
            .unwrap_or(fallback)
    }

    fn first_within(page: &Page, scope: NodeId, candidates: &[&str]) -> Option<NodeId> {
        candidates.iter().find_map(|css| locate(page, scope, css))
    }
}

impl SiteSchema for GenericSchema {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn family(&self) -> SourceFamily {
        SourceFamily::HtmlOnly
    }

    fn matches(&self, _hostname: &str) -> bool {
        true
    }

    fn post_selector(&self, page: &Page) -> &'static str {
        Self::first_present(page, POST_CANDIDATES, POST_CANDIDATES[0])
    }

    fn quote_link_selector(&self, page: &Page) -> &'static str {
        Self::first_present(page, QUOTE_CANDIDATES, QUOTE_CANDIDATES[3])
    }

    fn extract_post_id(&self, page: &Page, element: NodeId) -> Option<String> {
        post_id_from(page, element, ID_ATTRS, true)
    }

    fn message_element(&self, page: &Page, post: NodeId) -> Option<NodeId> {
        Self::first_within(page, post, MESSAGE_CANDIDATES)
    }

    fn media_element(&self, page: &Page, post: NodeId) -> Option<NodeId> {
        Self::first_within(page, post, MEDIA_CANDIDATES)
    }

    fn author_element(&self, page: &Page, post: NodeId) -> Option<NodeId> {
        Self::first_within(page, post, AUTHOR_CANDIDATES)
    }
}
