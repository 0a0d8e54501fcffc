//! Site Schema Resolver
//!
//! Maps the page hostname to a [`SiteSchema`]: the selectors, id rules and API URL
//! builders for one archive family. Resolution is first-match over an ordered list
//! of family schemas with [`GenericSchema`] as the final fallback, so it never fails.

use crate::dom::{NodeId, Page};
use crate::model::SourceFamily;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

mod families;
mod generic;
mod location;

pub use families::{FoolFuukaSchema, FourChanSchema, FourPlebsSchema, HtmlOnlySchema};
pub use generic::GenericSchema;
pub use location::PageLocation;

/// Descriptor for one archive family.
///
/// Selector getters take the page so probing schemas can inspect it; family
/// schemas ignore it. API URL builders return `None` when the site has no
/// structured endpoint for the operation, which callers treat as DOM-only mode.
pub trait SiteSchema: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn family(&self) -> SourceFamily;

    fn matches(&self, hostname: &str) -> bool;

    fn post_selector(&self, page: &Page) -> &'static str;

    fn quote_link_selector(&self, page: &Page) -> &'static str;

    /// Archive id of a post element.
    fn extract_post_id(&self, page: &Page, element: NodeId) -> Option<String>;

    fn message_element(&self, page: &Page, post: NodeId) -> Option<NodeId>;

    fn media_element(&self, page: &Page, post: NodeId) -> Option<NodeId>;

    fn author_element(&self, page: &Page, post: NodeId) -> Option<NodeId>;

    fn post_api_url(&self, _location: &PageLocation, _board: &str, _id: &str) -> Option<String> {
        None
    }

    fn thread_api_url(
        &self,
        _location: &PageLocation,
        _board: &str,
        _thread_id: &str,
    ) -> Option<String> {
        None
    }

    /// Endpoint listing the posts that reply to `id`.
    fn replies_api_url(&self, _location: &PageLocation, _board: &str, _id: &str) -> Option<String> {
        None
    }
}

/// Family schemas in resolution order.
fn registry() -> Vec<Arc<dyn SiteSchema>> {
    vec![
        Arc::new(FourPlebsSchema),
        Arc::new(FoolFuukaSchema),
        Arc::new(FourChanSchema),
        Arc::new(HtmlOnlySchema::fireden()),
        Arc::new(HtmlOnlySchema::warosu()),
    ]
}

/// Pick the schema for `hostname`.
pub fn resolve(hostname: &str) -> Arc<dyn SiteSchema> {
    let hostname = hostname.trim().to_ascii_lowercase();
    let schema = registry()
        .into_iter()
        .find(|s| s.matches(&hostname))
        .unwrap_or_else(|| Arc::new(GenericSchema));
    debug!(host = %hostname, schema = schema.name(), "Resolved site schema");
    schema
}

/// Whether `hostname` is `domain` or one of its subdomains.
pub(crate) fn host_matches(hostname: &str, domain: &str) -> bool {
    hostname == domain
        || hostname
            .strip_suffix(domain)
            .map_or(false, |rest| rest.ends_with('.'))
}
