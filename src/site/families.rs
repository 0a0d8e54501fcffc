//! Schemas for archive families with known markup.

use super::{host_matches, PageLocation, SiteSchema};
use crate::dom::{NodeId, Page};
use crate::model::SourceFamily;
use tracing::warn;

/// Static element locators shared by family schemas.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Locators {
    pub post: &'static str,
    pub quote_link: &'static str,
    pub message: &'static str,
    pub media: &'static str,
    pub author: &'static str,
    /// Attributes consulted after the `p<n>` element id.
    pub id_attrs: &'static [&'static str],
}

impl Locators {
    pub(crate) fn post_id(&self, page: &Page, element: NodeId) -> Option<String> {
        post_id_from(page, element, self.id_attrs, false)
    }
}

/// First descendant of `scope` matching `css`.
pub(crate) fn locate(page: &Page, scope: NodeId, css: &str) -> Option<NodeId> {
    match page.query_first(scope, css) {
        Ok(found) => found,
        Err(e) => {
            warn!(error = %e, "Schema selector rejected");
            None
        }
    }
}

/// Id extraction shared by every schema: `id="p<n>"`, then (when `any_digits`)
/// the first digit run of the id, then the listed data attributes.
pub(crate) fn post_id_from(
    page: &Page,
    element: NodeId,
    id_attrs: &[&str],
    any_digits: bool,
) -> Option<String> {
    if let Some(id) = page.attr(element, "id") {
        if let Some(rest) = id.strip_prefix('p') {
            if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
                return Some(rest.to_string());
            }
        }
        if any_digits {
            let digits: String = id
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if !digits.is_empty() {
                return Some(digits);
            }
        }
    }
    id_attrs
        .iter()
        .filter_map(|attr| page.attr(element, attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn foolfuuka_api(host: &str, endpoint: &str, board: &str, num: &str) -> String {
    format!(
        "https://{}/_/api/chan/{}/?board={}&num={}",
        host, endpoint, board, num
    )
}

const FOURPLEBS_HOST: &str = "archive.4plebs.org";

const FOURPLEBS: Locators = Locators {
    post: ".post",
    quote_link: ".quotelink",
    message: ".text",
    media: ".img-container img",
    author: ".name",
    id_attrs: &[],
};

/// archive.4plebs.org: FoolFuuka API on a fixed host.
#[derive(Debug, Clone, Copy, Default)]
pub struct FourPlebsSchema;

impl SiteSchema for FourPlebsSchema {
    fn name(&self) -> &'static str {
        "4plebs"
    }

    fn family(&self) -> SourceFamily {
        SourceFamily::FourPlebs
    }

    fn matches(&self, hostname: &str) -> bool {
        host_matches(hostname, "4plebs.org")
    }

    fn post_selector(&self, _page: &Page) -> &'static str {
        FOURPLEBS.post
    }

    fn quote_link_selector(&self, _page: &Page) -> &'static str {
        FOURPLEBS.quote_link
    }

    fn extract_post_id(&self, page: &Page, element: NodeId) -> Option<String> {
        FOURPLEBS.post_id(page, element)
    }

    fn message_element(&self, page: &Page, post: NodeId) -> Option<NodeId> {
        locate(page, post, FOURPLEBS.message)
    }

    fn media_element(&self, page: &Page, post: NodeId) -> Option<NodeId> {
        locate(page, post, FOURPLEBS.media)
    }

    fn author_element(&self, page: &Page, post: NodeId) -> Option<NodeId> {
        locate(page, post, FOURPLEBS.author)
    }

    fn post_api_url(&self, _location: &PageLocation, board: &str, id: &str) -> Option<String> {
        Some(foolfuuka_api(FOURPLEBS_HOST, "post", board, id))
    }

    fn thread_api_url(
        &self,
        _location: &PageLocation,
        board: &str,
        thread_id: &str,
    ) -> Option<String> {
        Some(foolfuuka_api(FOURPLEBS_HOST, "thread", board, thread_id))
    }

    fn replies_api_url(&self, _location: &PageLocation, board: &str, id: &str) -> Option<String> {
        Some(foolfuuka_api(FOURPLEBS_HOST, "backlinks", board, id))
    }
}

/// Hosts running stock FoolFuuka.
pub const FOOLFUUKA_HOSTS: &[&str] = &[
    "desuarchive.org",
    "loveisover.me",
    "archived.moe",
    "thebarchive.com",
    "b4k.co",
    "b4k.dev",
    "nyafuu.org",
    "palanq.win",
    "archive.horse",
    "archiveofsins.com",
    "tokyochronos.net",
    "sage.moe",
    "whatisthisimnotgoodwithcomputers.com",
    "magyarchan.net",
    "4ch.be",
    "cuckchan.org",
];

const FOOLFUUKA: Locators = Locators {
    post: ".post",
    quote_link: ".postlink",
    message: ".text",
    media: ".post_file_image img",
    author: ".name",
    id_attrs: &["data-post-id"],
};

/// Generic FoolFuuka install; the API lives on the page's own host.
#[derive(Debug, Clone, Copy, Default)]
pub struct FoolFuukaSchema;

impl SiteSchema for FoolFuukaSchema {
    fn name(&self) -> &'static str {
        "foolfuuka"
    }

    fn family(&self) -> SourceFamily {
        SourceFamily::FoolFuuka
    }

    fn matches(&self, hostname: &str) -> bool {
        FOOLFUUKA_HOSTS.iter().any(|d| host_matches(hostname, d))
    }

    fn post_selector(&self, _page: &Page) -> &'static str {
        FOOLFUUKA.post
    }

    fn quote_link_selector(&self, _page: &Page) -> &'static str {
        FOOLFUUKA.quote_link
    }

    fn extract_post_id(&self, page: &Page, element: NodeId) -> Option<String> {
        FOOLFUUKA.post_id(page, element)
    }

    fn message_element(&self, page: &Page, post: NodeId) -> Option<NodeId> {
        locate(page, post, FOOLFUUKA.message)
    }

    fn media_element(&self, page: &Page, post: NodeId) -> Option<NodeId> {
        locate(page, post, FOOLFUUKA.media)
    }

    fn author_element(&self, page: &Page, post: NodeId) -> Option<NodeId> {
        locate(page, post, FOOLFUUKA.author)
    }

    fn post_api_url(&self, location: &PageLocation, board: &str, id: &str) -> Option<String> {
        Some(foolfuuka_api(&location.host, "post", board, id))
    }

    fn thread_api_url(
        &self,
        location: &PageLocation,
        board: &str,
        thread_id: &str,
    ) -> Option<String> {
        Some(foolfuuka_api(&location.host, "thread", board, thread_id))
    }

    fn replies_api_url(&self, location: &PageLocation, board: &str, id: &str) -> Option<String> {
        Some(foolfuuka_api(&location.host, "backlinks", board, id))
    }
}

const FOURCHAN: Locators = Locators {
    post: ".post",
    quote_link: ".quotelink",
    message: ".postMessage",
    media: ".fileThumb img",
    author: ".nameBlock .name",
    id_attrs: &["data-post"],
};

/// 4chan's read-only JSON API. There is no per-post endpoint, so post lookups
/// go through the thread named by the page location.
#[derive(Debug, Clone, Copy, Default)]
pub struct FourChanSchema;

impl SiteSchema for FourChanSchema {
    fn name(&self) -> &'static str {
        "4chan"
    }

    fn family(&self) -> SourceFamily {
        SourceFamily::FourChan
    }

    fn matches(&self, hostname: &str) -> bool {
        host_matches(hostname, "4chan.org") || host_matches(hostname, "4channel.org")
    }

    fn post_selector(&self, _page: &Page) -> &'static str {
        FOURCHAN.post
    }

    fn quote_link_selector(&self, _page: &Page) -> &'static str {
        FOURCHAN.quote_link
    }

    fn extract_post_id(&self, page: &Page, element: NodeId) -> Option<String> {
        FOURCHAN.post_id(page, element)
    }

    fn message_element(&self, page: &Page, post: NodeId) -> Option<NodeId> {
        locate(page, post, FOURCHAN.message)
    }

    fn media_element(&self, page: &Page, post: NodeId) -> Option<NodeId> {
        locate(page, post, FOURCHAN.media)
    }

    fn author_element(&self, page: &Page, post: NodeId) -> Option<NodeId> {
        locate(page, post, FOURCHAN.author)
    }

    fn post_api_url(&self, location: &PageLocation, board: &str, _id: &str) -> Option<String> {
        let thread_id = location.thread_id.as_deref()?;
        self.thread_api_url(location, board, thread_id)
    }

    fn thread_api_url(
        &self,
        _location: &PageLocation,
        board: &str,
        thread_id: &str,
    ) -> Option<String> {
        Some(format!(
            "https://a.4cdn.org/{}/thread/{}.json",
            board, thread_id
        ))
    }
}

/// Archives without a JSON API. Fetches return the thread page itself, which
/// is scraped with the schema's own locators.
#[derive(Debug, Clone, Copy)]
pub struct HtmlOnlySchema {
    name: &'static str,
    domain: &'static str,
    /// Thread page URL with `{board}` and `{id}` placeholders
    thread_page: &'static str,
    locators: Locators,
}

impl HtmlOnlySchema {
    pub fn fireden() -> Self {
        Self {
            name: "fireden",
            domain: "fireden.net",
            thread_page: "https://boards.fireden.net/{board}/thread/{id}/",
            locators: Locators {
                post: ".post",
                quote_link: ".quotelink",
                message: ".post_body",
                media: ".post_file img",
                author: ".post_author",
                id_attrs: &["data-id"],
            },
        }
    }

    pub fn warosu() -> Self {
        Self {
            name: "warosu",
            domain: "warosu.org",
            thread_page: "https://warosu.org/{board}/thread/{id}",
            locators: Locators {
                post: ".post",
                quote_link: ".posterquote",
                message: ".postbody",
                media: ".img-container img",
                author: ".postername",
                id_attrs: &["data-id"],
            },
        }
    }

    fn page_url(&self, board: &str, id: &str) -> String {
        self.thread_page
            .replace("{board}", board)
            .replace("{id}", id)
    }
}

impl SiteSchema for HtmlOnlySchema {
    fn name(&self) -> &'static str {
        self.name
    }

    fn family(&self) -> SourceFamily {
        SourceFamily::HtmlOnly
    }

    fn matches(&self, hostname: &str) -> bool {
        host_matches(hostname, self.domain)
    }

    fn post_selector(&self, _page: &Page) -> &'static str {
        self.locators.post
    }

    fn quote_link_selector(&self, _page: &Page) -> &'static str {
        self.locators.quote_link
    }

    fn extract_post_id(&self, page: &Page, element: NodeId) -> Option<String> {
        self.locators.post_id(page, element)
    }

    fn message_element(&self, page: &Page, post: NodeId) -> Option<NodeId> {
        locate(page, post, self.locators.message)
    }

    fn media_element(&self, page: &Page, post: NodeId) -> Option<NodeId> {
        locate(page, post, self.locators.media)
    }

    fn author_element(&self, page: &Page, post: NodeId) -> Option<NodeId> {
        locate(page, post, self.locators.author)
    }

    /// The thread page containing the post; the page's own thread when known.
    fn post_api_url(&self, location: &PageLocation, board: &str, id: &str) -> Option<String> {
        let thread_id = location.thread_id.as_deref().unwrap_or(id);
        Some(self.page_url(board, thread_id))
    }

    fn thread_api_url(
        &self,
        _location: &PageLocation,
        board: &str,
        thread_id: &str,
    ) -> Option<String> {
        Some(self.page_url(board, thread_id))
    }
}
