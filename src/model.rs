//! Canonical post and thread records.
//!
//! Every archive family is normalized into these shapes. Timestamps are epoch
//! milliseconds regardless of the unit the archive reports.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display name used when an archive omits the poster name.
pub const DEFAULT_AUTHOR: &str = "Anonymous";

/// API family that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFamily {
    FourChan,
    FourPlebs,
    FoolFuuka,
    HtmlOnly,
}

impl SourceFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFamily::FourChan => "4chan",
            SourceFamily::FourPlebs => "4plebs",
            SourceFamily::FoolFuuka => "foolfuuka",
            SourceFamily::HtmlOnly => "html",
        }
    }
}

impl fmt::Display for SourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(board, id)` pair identifying a post across the whole archive network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostKey {
    pub board: String,
    pub id: String,
}

impl PostKey {
    pub fn new(board: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            board: board.into(),
            id: id.into(),
        }
    }

    /// Parse the `board:id` form used by persisted user state.
    pub fn parse(s: &str) -> Option<Self> {
        let (board, id) = s.split_once(':')?;
        if board.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self::new(board, id))
    }
}

impl fmt::Display for PostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.board, self.id)
    }
}

/// Attached file metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub filename: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A single archived post. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub board: String,
    pub thread_id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub author: String,
    pub tripcode: Option<String>,
    pub subject: Option<String>,
    /// Sanitized HTML fragment.
    pub body_html: String,
    pub media: Option<Media>,
    pub source: SourceFamily,
}

impl Post {
    pub fn key(&self) -> PostKey {
        PostKey::new(&self.board, &self.id)
    }

    pub fn is_op(&self) -> bool {
        self.id == self.thread_id
    }

    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// An ordered thread. Post order is archive order and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub board: String,
    pub posts: Vec<Post>,
    pub source: SourceFamily,
}

impl Thread {
    pub fn key(&self) -> PostKey {
        PostKey::new(&self.board, &self.id)
    }

    pub fn post(&self, id: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == id)
    }

    pub fn op(&self) -> Option<&Post> {
        self.posts.first()
    }

    /// Highest numeric post id in the thread.
    pub fn newest_id(&self) -> Option<u64> {
        self.posts.iter().filter_map(|p| p.id.parse().ok()).max()
    }
}
