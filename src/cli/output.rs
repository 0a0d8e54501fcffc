//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{ArchlinkError, FetchError};
use owo_colors::OwoColorize;

/// Map domain errors to a single line for stderr, with a category prefix.
pub fn map_error(e: &ArchlinkError) -> String {
    let category = match e {
        ArchlinkError::Fetch(FetchError::NotFound { .. }) => "not found",
        ArchlinkError::Fetch(FetchError::UnsupportedSite { .. }) => "unsupported",
        ArchlinkError::Fetch(FetchError::RateLimitExhausted { .. }) => "rate limited",
        ArchlinkError::Fetch(_) => "network",
        ArchlinkError::State(_) => "state",
        ArchlinkError::ConfigError(_) => "config",
        ArchlinkError::InvalidUrl { .. } => "usage",
        _ => "error",
    };
    format!("{} {}", format!("{}:", category).red().bold(), e)
}
