//! Error types for archive post resolution.

use thiserror::Error;

/// Failures surfaced by the fetch/parse adapter.
///
/// Every variant reaches the caller. The expansion controller turns them into an
/// inline error block scoped to the link that triggered the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Post {board}/{id} not found")]
    NotFound { board: String, id: String },

    #[error("HTTP request to {url} failed: {message}")]
    Http {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Request to {url} timed out after {after_ms} ms")]
    Timeout { url: String, after_ms: u64 },

    #[error("Still rate limited by {url} after {attempts} attempts")]
    RateLimitExhausted { url: String, attempts: u32 },

    #[error("Unexpected {family} response: {message}")]
    Parse { family: String, message: String },

    /// The archive answered with an `error` member instead of data.
    #[error("Archive reported an error: {message}")]
    Archive { message: String },

    #[error("Site '{schema}' has no {operation} endpoint")]
    UnsupportedSite { schema: String, operation: String },
}

impl FetchError {
    /// Timeouts belong to the HTTP class of failures.
    pub fn is_http(&self) -> bool {
        matches!(self, FetchError::Http { .. } | FetchError::Timeout { .. })
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => *status,
            FetchError::RateLimitExhausted { .. } => Some(429),
            _ => None,
        }
    }

    pub(crate) fn parse(family: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Parse {
            family: family.into(),
            message: message.into(),
        }
    }
}

/// Errors from the user-state key-value store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("State store error: {0}")]
    Store(String),

    #[error("State serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("State I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StateError {
    fn from(err: sled::Error) -> Self {
        StateError::Store(err.to_string())
    }
}

/// Invalid selector text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid selector '{selector}': {reason}")]
pub struct SelectorError {
    pub selector: String,
    pub reason: String,
}

/// Mutation watcher queue failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    #[error("Mutation queue is full ({capacity} batches)")]
    QueueFull { capacity: usize },

    #[error("Mutation watcher has stopped")]
    Closed,
}

/// Top-level error for page contexts and the command line.
#[derive(Debug, Error)]
pub enum ArchlinkError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("Page has no {0}")]
    MissingContext(String),

    #[error("Invalid page URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Node {0} is not a quote link")]
    NotQuoteLink(usize),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<config::ConfigError> for ArchlinkError {
    fn from(err: config::ConfigError) -> Self {
        ArchlinkError::ConfigError(err.to_string())
    }
}
