//! Default configuration values
//!
//! All constants used throughout the config module are defined here.

/// Cached scans older than this are dropped when the cache is loaded
pub const DEFAULT_CACHE_RETENTION_DAYS: i64 = 30;

/// Cache file name inside the per-user data directory
pub const DEFAULT_CACHE_FILE_NAME: &str = "menu_cache.json";

/// Directory name used under the data dir and the home dir
pub const APP_DIR_NAME: &str = "menukeys";

/// How long to wait for a lazily populated menu after opening it
pub const DEFAULT_ACTIVATION_WAIT_MS: u64 = 50;

/// Deeper subtrees are skipped
pub const DEFAULT_MAX_MENU_DEPTH: usize = 64;

/// Extra attempts to obtain the menu bar after bringing the app forward
pub const DEFAULT_MENU_BAR_RETRIES: u32 = 2;

/// Backoff before each menu bar retry (multiplied by the attempt number)
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;

/// Recent applications kept for on-demand inspection
pub const DEFAULT_RECENT_APPS_MAX: usize = 10;

/// Our own bundle id; never tracked as a target
pub const SELF_BUNDLE_ID: &str = "dev.menukeys.menukeys";

/// Default config file location
pub const DEFAULT_CONFIG_PATH: &str = "~/.menukeys/config.json";
