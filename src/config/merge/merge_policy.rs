//! Merge rules: defaults first, every later source overrides key by key.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("settings.cache.enabled", true)?
        .set_default("settings.cache.max_size", 500)?
        .set_default("settings.cache.post_ttl_secs", 30 * 60)?
        .set_default("settings.cache.thread_ttl_secs", 5 * 60)?
        .set_default("settings.cache.rendered_ttl_secs", 30 * 60)?
        .set_default("settings.network.request_timeout_secs", 15)?
        .set_default("settings.network.max_retries", 3)?
        .set_default("settings.network.backoff_base_ms", 1000)?
        .set_default("settings.expansion.max_depth", 8)
}
