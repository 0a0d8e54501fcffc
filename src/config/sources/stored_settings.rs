//! Stored settings source: the flat settings object kept by the options UI.
//!
//! The object uses the UI's own key names (`cacheEnable`, `requestTimeout`,
//! `highlightKeywords`, ...), sometimes nested under `advanced` or
//! `postProcessing`. Recognized keys are translated into the `settings.*` tree;
//! unknown keys are ignored.

use crate::highlight::KeywordRule;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};
use serde_json::{json, Map, Value};

const NESTED_GROUPS: &[&str] = &["advanced", "postProcessing", "general"];

/// Add the translated stored settings object as a source.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    stored: &Value,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let translated = translate_stored_settings(stored);
    Ok(builder.add_source(Config::try_from(&translated)?))
}

fn lookup<'a>(stored: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    for key in keys {
        if let Some(v) = stored.get(*key) {
            return Some(v);
        }
        for group in NESTED_GROUPS {
            if let Some(v) = stored.get(*group).and_then(|g| g.get(*key)) {
                return Some(v);
            }
        }
    }
    None
}

fn keyword_rules(value: &Value) -> Option<Vec<KeywordRule>> {
    match value {
        Value::String(s) => Some(KeywordRule::parse_list(s)),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => KeywordRule::parse_list(s).into_iter().next(),
                    Value::Object(_) => serde_json::from_value(item.clone()).ok(),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    }
}

/// Translate the UI settings object into a `{ "settings": { ... } }` override tree.
pub fn translate_stored_settings(stored: &Value) -> Value {
    let mut cache = Map::new();
    let mut network = Map::new();
    let mut highlight = Map::new();
    let mut expansion = Map::new();
    let mut settings = Map::new();

    if let Some(v) = lookup(stored, &["cacheEnable", "cacheEnabled"]).and_then(Value::as_bool) {
        cache.insert("enabled".into(), json!(v));
    }
    if let Some(v) = lookup(stored, &["maxCacheSize"]).and_then(Value::as_u64) {
        cache.insert("max_size".into(), json!(v));
    }
    if let Some(hours) = lookup(stored, &["cacheDuration"]).and_then(Value::as_u64) {
        cache.insert("post_ttl_secs".into(), json!(hours * 3600));
        cache.insert("rendered_ttl_secs".into(), json!(hours * 3600));
    }
    if let Some(v) = lookup(stored, &["requestTimeout"]).and_then(Value::as_u64) {
        network.insert("request_timeout_secs".into(), json!(v));
    }
    if let Some(v) = lookup(stored, &["maxRetries"]).and_then(Value::as_u64) {
        network.insert("max_retries".into(), json!(v));
    }
    if let Some(v) = lookup(stored, &["autoExpand"]).and_then(Value::as_bool) {
        expansion.insert("auto_expand".into(), json!(v));
    }
    if let Some(v) = lookup(stored, &["showBacklinks"]).and_then(Value::as_bool) {
        expansion.insert("show_backlinks".into(), json!(v));
    }
    if let Some(v) = lookup(stored, &["debugMode"]).and_then(Value::as_bool) {
        settings.insert("debug_mode".into(), json!(v));
    }

    match lookup(stored, &["highlightKeywords", "highlightPosts"]) {
        Some(Value::Bool(enabled)) => {
            highlight.insert("enabled".into(), json!(enabled));
        }
        Some(v @ Value::String(_)) => {
            if let Some(rules) = keyword_rules(v) {
                highlight.insert("enabled".into(), json!(!rules.is_empty()));
                highlight.insert("keywords".into(), json!(rules));
            }
        }
        _ => {}
    }
    if let Some(rules) = lookup(stored, &["keywords"]).and_then(keyword_rules) {
        highlight.insert("keywords".into(), json!(rules));
    }

    for (name, section) in [
        ("cache", cache),
        ("network", network),
        ("highlight", highlight),
        ("expansion", expansion),
    ] {
        if !section.is_empty() {
            settings.insert(name.into(), Value::Object(section));
        }
    }
    json!({ "settings": settings })
}
