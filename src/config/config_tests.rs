use super::*;
use std::time::Duration;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.cache.retention_days, DEFAULT_CACHE_RETENTION_DAYS);
    assert_eq!(config.scan.activation_wait_ms, DEFAULT_ACTIVATION_WAIT_MS);
    assert_eq!(config.scan.max_depth, DEFAULT_MAX_MENU_DEPTH);
    assert_eq!(config.scan.menu_bar_retries, DEFAULT_MENU_BAR_RETRIES);
    assert_eq!(config.recent_apps.max_apps, DEFAULT_RECENT_APPS_MAX);
    assert_eq!(config.recent_apps.ignored_bundle_ids, vec![SELF_BUNDLE_ID.to_string()]);
}

#[test]
fn test_empty_json_uses_defaults() {
    let config: Config = serde_json::from_str("{}").unwrap();
    assert_eq!(config.cache.retention_days, 30);
    assert!(config.cache.path.is_none());
    assert_eq!(config.scan.retry_backoff_ms, DEFAULT_RETRY_BACKOFF_MS);
}

#[test]
fn test_partial_json_camel_case() {
    let json = r#"{
        "cache": { "retentionDays": 7, "path": "/tmp/menukeys/cache.json" },
        "scan": { "activationWaitMs": 120, "maxDepth": 8 }
    }"#;
    let config: Config = serde_json::from_str(json).unwrap();
    assert_eq!(config.cache.retention_days, 7);
    assert_eq!(config.scan.activation_wait_ms, 120);
    assert_eq!(config.scan.max_depth, 8);
    // Untouched fields keep their defaults
    assert_eq!(config.scan.menu_bar_retries, DEFAULT_MENU_BAR_RETRIES);
    assert_eq!(
        config.cache_path(),
        std::path::PathBuf::from("/tmp/menukeys/cache.json")
    );
}

#[test]
fn test_walk_options_conversion() {
    let mut config = Config::default();
    config.scan.activation_wait_ms = 75;
    config.scan.max_depth = 0;
    let options = config.walk_options();
    assert_eq!(options.activation_wait, Duration::from_millis(75));
    assert_eq!(options.max_depth, 1, "depth is floored at one");
    assert_eq!(options.menu_bar_retries, DEFAULT_MENU_BAR_RETRIES);
}

#[test]
fn test_default_cache_path_file_name() {
    let path = Config::default().cache_path();
    assert!(path.ends_with("menukeys/menu_cache.json"));
}

#[test]
fn test_retention_floor() {
    let mut config = Config::default();
    config.cache.retention_days = 0;
    assert_eq!(config.retention(), chrono::Duration::days(1));
}

#[test]
fn test_load_missing_file_returns_default() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config_from(&dir.path().join("nope.json"));
    assert_eq!(config.cache.retention_days, DEFAULT_CACHE_RETENTION_DAYS);
}

#[test]
fn test_load_invalid_file_returns_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();
    let config = load_config_from(&path);
    assert_eq!(config.scan.max_depth, DEFAULT_MAX_MENU_DEPTH);
}

#[test]
fn test_load_valid_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"recentApps":{"maxApps":3}}"#).unwrap();
    let config = load_config_from(&path);
    assert_eq!(config.recent_apps.max_apps, 3);
}
