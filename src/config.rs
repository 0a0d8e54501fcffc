//! Configuration System
//!
//! Layered configuration for page contexts and the command line. Defaults, the
//! global config file, an explicit file, the stored settings object and
//! environment variables are merged by [`ConfigLoader`], lowest precedence first.

use crate::highlight::KeywordRule;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::{ConfigLoader, LoadOptions};
pub use sources::global_file::global_config_path;
pub use sources::stored_settings::translate_stored_settings;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchlinkConfig {
    /// Behaviour of the resolution engine
    #[serde(default)]
    pub settings: Settings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Storage paths
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Everything the engine reads at runtime. Nothing downstream hardcodes these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub highlight: HighlightSettings,
    #[serde(default)]
    pub expansion: ExpansionSettings,
    #[serde(default)]
    pub watcher: WatcherSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub debug_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Entry bound per kind
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_post_ttl")]
    pub post_ttl_secs: u64,
    #[serde(default = "default_thread_ttl")]
    pub thread_ttl_secs: u64,
    #[serde(default = "default_post_ttl")]
    pub rendered_ttl_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSettings {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HighlightSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub keywords: Vec<KeywordRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub auto_expand: bool,
    #[serde(default = "default_max_auto_expand")]
    pub max_auto_expand: usize,
    /// Maximum number of nested expansion containers
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_true")]
    pub show_backlinks: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherSettings {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// Upper bound on passes over posts whose reply lookup failed
    #[serde(default = "default_max_passes")]
    pub max_passes: u32,
    #[serde(default = "default_delay_ms")]
    pub default_delay_ms: u64,
    #[serde(default = "default_slow_hosts")]
    pub slow_hosts: Vec<HostDelay>,
}

/// Request spacing for a host that throttles aggressively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDelay {
    pub host: String,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// User state database; defaults to the platform data directory
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_max_size() -> usize {
    500
}

fn default_post_ttl() -> u64 {
    30 * 60
}

fn default_thread_ttl() -> u64 {
    5 * 60
}

fn default_sweep_interval() -> u64 {
    10 * 60
}

fn default_request_timeout() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    1000
}

fn default_max_auto_expand() -> usize {
    5
}

fn default_max_depth() -> usize {
    8
}

fn default_queue_capacity() -> usize {
    64
}

fn default_max_passes() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    50
}

fn default_slow_hosts() -> Vec<HostDelay> {
    vec![
        HostDelay {
            host: "4plebs.org".to_string(),
            delay_ms: 1000,
        },
        HostDelay {
            host: "archived.moe".to_string(),
            delay_ms: 1000,
        },
        HostDelay {
            host: "b4k".to_string(),
            delay_ms: 3500,
        },
    ]
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: default_max_size(),
            post_ttl_secs: default_post_ttl(),
            thread_ttl_secs: default_thread_ttl(),
            rendered_ttl_secs: default_post_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base(),
        }
    }
}

impl NetworkSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Wait before retry number `attempt` (zero-based): `base * (attempt + 1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(u64::from(attempt) + 1))
    }
}

impl Default for ExpansionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_expand: false,
            max_auto_expand: default_max_auto_expand(),
            max_depth: default_max_depth(),
            show_backlinks: true,
        }
    }
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            max_passes: default_max_passes(),
            default_delay_ms: default_delay_ms(),
            slow_hosts: default_slow_hosts(),
        }
    }
}

impl DiscoverySettings {
    /// Spacing between consecutive reply lookups against `host`.
    pub fn delay_for(&self, host: &str) -> Duration {
        let ms = self
            .slow_hosts
            .iter()
            .find(|h| host.contains(h.host.as_str()))
            .map(|h| h.delay_ms)
            .unwrap_or(self.default_delay_ms);
        Duration::from_millis(ms)
    }
}

impl StorageConfig {
    /// Resolve the user state database path.
    pub fn resolve_state_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.state_path {
            return Some(path.clone());
        }
        directories::ProjectDirs::from("org", "archlink", "archlink")
            .map(|dirs| dirs.data_dir().join("state"))
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Cache(String),
    Network(String),
    Highlight(String),
    Expansion(String),
    Watcher(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Cache(msg) => write!(f, "Cache: {}", msg),
            ValidationError::Network(msg) => write!(f, "Network: {}", msg),
            ValidationError::Highlight(msg) => write!(f, "Highlight: {}", msg),
            ValidationError::Expansion(msg) => write!(f, "Expansion: {}", msg),
            ValidationError::Watcher(msg) => write!(f, "Watcher: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ArchlinkConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let s = &self.settings;

        if s.cache.max_size == 0 {
            errors.push(ValidationError::Cache("max_size must be at least 1".to_string()));
        }
        if s.cache.sweep_interval_secs == 0 {
            errors.push(ValidationError::Cache(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        if s.network.request_timeout_secs == 0 {
            errors.push(ValidationError::Network(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        for rule in &s.highlight.keywords {
            if rule.keyword.trim().is_empty() {
                errors.push(ValidationError::Highlight("empty keyword".to_string()));
            }
            if !crate::highlight::is_valid_color(&rule.color) {
                errors.push(ValidationError::Highlight(format!(
                    "invalid color '{}' for keyword '{}'",
                    rule.color, rule.keyword
                )));
            }
        }
        if s.expansion.max_depth == 0 {
            errors.push(ValidationError::Expansion(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if s.watcher.queue_capacity == 0 {
            errors.push(ValidationError::Watcher(
                "queue_capacity must be at least 1".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
