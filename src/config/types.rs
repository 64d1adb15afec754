//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::*;
use crate::menu_tree::WalkOptions;

// ============================================
// CACHE CONFIG
// ============================================

/// Menu cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Entries cached longer ago than this are dropped at load (default: 30)
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Override for the cache file location (supports `~`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_retention_days() -> i64 {
    DEFAULT_CACHE_RETENTION_DAYS
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            retention_days: DEFAULT_CACHE_RETENTION_DAYS,
            path: None,
        }
    }
}

// ============================================
// SCAN CONFIG
// ============================================

/// Menu tree walk settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    /// Wait after opening a lazily populated top-level menu (default: 50)
    #[serde(default = "default_activation_wait_ms")]
    pub activation_wait_ms: u64,
    /// Maximum traversal depth (default: 64)
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Additional attempts to obtain the menu bar (default: 2)
    #[serde(default = "default_menu_bar_retries")]
    pub menu_bar_retries: u32,
    /// Base backoff between menu bar attempts (default: 100)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_activation_wait_ms() -> u64 {
    DEFAULT_ACTIVATION_WAIT_MS
}
fn default_max_depth() -> usize {
    DEFAULT_MAX_MENU_DEPTH
}
fn default_menu_bar_retries() -> u32 {
    DEFAULT_MENU_BAR_RETRIES
}
fn default_retry_backoff_ms() -> u64 {
    DEFAULT_RETRY_BACKOFF_MS
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            activation_wait_ms: DEFAULT_ACTIVATION_WAIT_MS,
            max_depth: DEFAULT_MAX_MENU_DEPTH,
            menu_bar_retries: DEFAULT_MENU_BAR_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

// ============================================
// RECENT APPS CONFIG
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentAppsConfig {
    /// Maximum number of recent applications (default: 10)
    #[serde(default = "default_recent_apps_max")]
    pub max_apps: usize,
    /// Bundle ids never recorded (default: our own)
    #[serde(default = "default_ignored_bundle_ids")]
    pub ignored_bundle_ids: Vec<String>,
}

fn default_recent_apps_max() -> usize {
    DEFAULT_RECENT_APPS_MAX
}
fn default_ignored_bundle_ids() -> Vec<String> {
    vec![SELF_BUNDLE_ID.to_string()]
}

impl Default for RecentAppsConfig {
    fn default() -> Self {
        RecentAppsConfig {
            max_apps: DEFAULT_RECENT_APPS_MAX,
            ignored_bundle_ids: default_ignored_bundle_ids(),
        }
    }
}

// ============================================
// MAIN CONFIG
// ============================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub recent_apps: RecentAppsConfig,
}

impl Config {
    /// Resolved cache file path.
    ///
    /// Uses the configured override, else `<data_dir>/menukeys/menu_cache.json`
    /// (Application Support on macOS).
    pub fn cache_path(&self) -> PathBuf {
        if let Some(path) = &self.cache.path {
            return PathBuf::from(shellexpand::tilde(path).as_ref());
        }
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR_NAME))
            .join(DEFAULT_CACHE_FILE_NAME)
    }

    /// Retention window, floored at one day
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.cache.retention_days.max(1))
    }

    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            activation_wait: Duration::from_millis(self.scan.activation_wait_ms),
            max_depth: self.scan.max_depth.max(1),
            menu_bar_retries: self.scan.menu_bar_retries,
            retry_backoff: Duration::from_millis(self.scan.retry_backoff_ms),
        }
    }
}
