//! Page URL decoding: host, board and current thread.

use crate::dom::Page;
use crate::error::ArchlinkError;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;

/// Board used when none can be determined.
pub const FALLBACK_BOARD: &str = "_";

lazy_static! {
    static ref THREAD_PATH: Regex = Regex::new(r"^/([A-Za-z0-9_]+)/thread/(\d+)").unwrap();
    static ref BOARD_SEGMENT: Regex = Regex::new(r"^[A-Za-z0-9]+$").unwrap();
    static ref THREAD_ELEMENT_ID: Regex = Regex::new(r"^t(\d+)$").unwrap();
}

/// Where the page being augmented lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    pub url: String,
    pub host: String,
    pub board: String,
    pub thread_id: Option<String>,
}

impl PageLocation {
    /// Decode `url` alone. The board falls back to `_` and the thread id to `None`.
    pub fn parse(url: &str) -> Result<Self, ArchlinkError> {
        let parsed = Url::parse(url).map_err(|e| ArchlinkError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ArchlinkError::InvalidUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            })?
            .to_ascii_lowercase();

        let path = parsed.path();
        let (board, thread_id) = match THREAD_PATH.captures(path) {
            Some(caps) => (caps[1].to_string(), Some(caps[2].to_string())),
            None => {
                let first = path.split('/').find(|s| !s.is_empty()).unwrap_or("");
                let board = if BOARD_SEGMENT.is_match(first) {
                    first.to_string()
                } else {
                    FALLBACK_BOARD.to_string()
                };
                (board, None)
            }
        };

        Ok(Self {
            url: url.to_string(),
            host,
            board,
            thread_id,
        })
    }

    /// Decode `url`, filling gaps from the document: `meta[name="board"]` for the
    /// board and a `.thread` element with id `t<n>` for the thread.
    pub fn detect(url: &str, page: &Page) -> Result<Self, ArchlinkError> {
        let mut location = Self::parse(url)?;
        if location.board == FALLBACK_BOARD {
            if let Some(board) = page
                .query_first(page.root(), "meta[name=\"board\"]")?
                .and_then(|m| page.attr(m, "content"))
                .map(str::trim)
                .filter(|b| !b.is_empty())
            {
                location.board = board.to_string();
            }
        }
        if location.thread_id.is_none() {
            location.thread_id = page
                .query(page.root(), ".thread[id]")?
                .into_iter()
                .filter_map(|t| page.attr(t, "id"))
                .find_map(|id| THREAD_ELEMENT_ID.captures(id).map(|c| c[1].to_string()));
        }
        Ok(location)
    }

    pub fn is_thread_page(&self) -> bool {
        self.thread_id.is_some()
    }
}
