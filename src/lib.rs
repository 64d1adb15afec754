//! menukeys - keyboard shortcuts of the frontmost macOS application
//!
//! Reads the focused application's menu bar through the Accessibility API,
//! decodes every command's shortcut, and caches the result per application
//! version so switching back to an app is instant.

pub mod bundle_info;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod frontmost_app_tracker;
pub mod logging;
pub mod menu_cache;
pub mod menu_tree;
pub mod model;
pub mod recent_apps;
pub mod shortcut;

// AXUIElement / NSRunningApplication access
#[cfg(target_os = "macos")]
pub mod menu_bar;
