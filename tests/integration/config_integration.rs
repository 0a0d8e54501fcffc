//! Integration tests for configuration layering

use crate::integration::test_utils::{with_env, with_xdg_env};
use archlink::config::{ConfigLoader, LoadOptions, ValidationError};
use archlink::state::{UserState, SETTINGS_KEY};
use serde_json::json;
use tempfile::TempDir;

fn write_global(test_dir: &TempDir, contents: &str) {
    let dir = test_dir.path().join("archlink");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), contents).unwrap();
}

#[test]
fn test_global_file_is_picked_up() {
    let test_dir = TempDir::new().unwrap();
    write_global(&test_dir, "[settings.cache]\nmax_size = 12\n");

    let config = with_xdg_env(&test_dir, ConfigLoader::load).unwrap();
    assert_eq!(config.settings.cache.max_size, 12);
    assert_eq!(config.settings.network.max_retries, 3);
}

#[test]
fn test_explicit_file_overrides_global() {
    let test_dir = TempDir::new().unwrap();
    write_global(
        &test_dir,
        "[settings.cache]\nmax_size = 12\n\n[settings.network]\nmax_retries = 1\n",
    );
    let explicit = test_dir.path().join("site.toml");
    std::fs::write(&explicit, "[settings.cache]\nmax_size = 99\n").unwrap();

    let config = with_xdg_env(&test_dir, || ConfigLoader::load_from_file(&explicit)).unwrap();
    assert_eq!(config.settings.cache.max_size, 99);
    assert_eq!(config.settings.network.max_retries, 1, "untouched keys keep the global value");
}

#[test]
fn test_environment_has_highest_precedence() {
    let test_dir = TempDir::new().unwrap();
    write_global(&test_dir, "[settings.cache]\nmax_size = 12\n");

    let config = with_env(
        &test_dir,
        &[
            ("ARCHLINK__SETTINGS__CACHE__MAX_SIZE", "7"),
            ("ARCHLINK__SETTINGS__EXPANSION__AUTO_EXPAND", "true"),
        ],
        || {
            ConfigLoader::load_with(&LoadOptions {
                stored_settings: Some(json!({ "maxCacheSize": 40 })),
                ..LoadOptions::default()
            })
        },
    )
    .unwrap();
    assert_eq!(config.settings.cache.max_size, 7);
    assert!(config.settings.expansion.auto_expand);
}

#[test]
fn test_stored_settings_from_user_state() {
    let test_dir = TempDir::new().unwrap();
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let state = UserState::in_memory();
    runtime
        .block_on(state.store().set(
            SETTINGS_KEY,
            json!({
                "cacheEnable": false,
                "advanced": { "requestTimeout": 30 },
                "highlightKeywords": "rust:#ff0000, tokio",
            }),
        ))
        .unwrap();
    let stored = runtime.block_on(state.stored_settings()).unwrap();

    let config = with_xdg_env(&test_dir, || {
        ConfigLoader::load_with(&LoadOptions {
            stored_settings: stored,
            ..LoadOptions::default()
        })
    })
    .unwrap();
    assert!(!config.settings.cache.enabled);
    assert_eq!(config.settings.network.request_timeout_secs, 30);
    assert!(config.settings.highlight.enabled);
    let keywords: Vec<&str> = config
        .settings
        .highlight
        .keywords
        .iter()
        .map(|k| k.keyword.as_str())
        .collect();
    assert_eq!(keywords, vec!["rust", "tokio"]);
}

#[test]
fn test_invalid_values_are_all_reported() {
    let test_dir = TempDir::new().unwrap();
    write_global(
        &test_dir,
        r##"
[settings.cache]
max_size = 0

[settings.watcher]
queue_capacity = 0

[[settings.highlight.keywords]]
keyword = "rust"
color = "not-a-color"
"##,
    );

    let config = with_xdg_env(&test_dir, ConfigLoader::load).unwrap();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().any(|e| matches!(e, ValidationError::Cache(_))));
    assert!(errors.iter().any(|e| matches!(e, ValidationError::Watcher(_))));
    assert!(errors.iter().any(|e| matches!(e, ValidationError::Highlight(_))));
}

#[test]
fn test_malformed_file_is_config_error() {
    let test_dir = TempDir::new().unwrap();
    let explicit = test_dir.path().join("broken.toml");
    std::fs::write(&explicit, "[settings.cache\nmax_size = ").unwrap();

    let result = with_xdg_env(&test_dir, || ConfigLoader::load_from_file(&explicit));
    assert!(result.is_err());
}
