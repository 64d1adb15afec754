//! Configuration module - runtime settings
//!
//! This module provides functionality for:
//! - Loading configuration from ~/.menukeys/config.json
//! - Default values for all settings
//! - Type definitions for config structures
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values
//! - `types` - Configuration struct definitions (Config, CacheConfig, etc.)
//! - `loader` - File system loading and parsing

mod defaults;
mod loader;
mod types;

pub use defaults::{
    APP_DIR_NAME, DEFAULT_ACTIVATION_WAIT_MS, DEFAULT_CACHE_RETENTION_DAYS, DEFAULT_MAX_MENU_DEPTH,
    DEFAULT_MENU_BAR_RETRIES, DEFAULT_RECENT_APPS_MAX, DEFAULT_RETRY_BACKOFF_MS, SELF_BUNDLE_ID,
};

pub use types::{CacheConfig, Config, RecentAppsConfig, ScanConfig};

pub use loader::{load_config, load_config_from};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
