//! Application bundle facts used for cache fingerprints
//!
//! Version strings come from the bundle's Info.plist, read through
//! `/usr/libexec/PlistBuddy`. The modification time is the bundle
//! directory's own mtime, which changes whenever an update replaces it.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;
use std::process::Command;
use tracing::debug;

use crate::model::BundleMetadata;

const PLIST_BUDDY: &str = "/usr/libexec/PlistBuddy";
const SHORT_VERSION_KEY: &str = "CFBundleShortVersionString";
const BUILD_VERSION_KEY: &str = "CFBundleVersion";

/// Recorded when neither version key is present
pub const UNKNOWN_VERSION: &str = "unknown";

/// Version and modification time for the bundle at `app_path`.
///
/// None when the bundle can't be stat'ed.
pub fn read_bundle_metadata(app_path: &Path) -> Option<BundleMetadata> {
    let modification_time = match bundle_modification_time(app_path) {
        Ok(time) => time,
        Err(e) => {
            debug!(error = %e, path = %app_path.display(), "No bundle modification time");
            return None;
        }
    };

    let version = resolve_version(
        read_info_plist_key(app_path, SHORT_VERSION_KEY),
        read_info_plist_key(app_path, BUILD_VERSION_KEY),
    );

    Some(BundleMetadata {
        version,
        modification_time,
    })
}

/// Marketing version, else build number, else [`UNKNOWN_VERSION`]
pub fn resolve_version(short_version: Option<String>, build_version: Option<String>) -> String {
    short_version
        .filter(|v| !v.trim().is_empty())
        .or(build_version.filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
}

/// Last modification time of the bundle directory
pub fn bundle_modification_time(app_path: &Path) -> Result<DateTime<Utc>> {
    let metadata = std::fs::metadata(app_path)
        .with_context(|| format!("Failed to stat bundle: {}", app_path.display()))?;
    let mtime = filetime::FileTime::from_last_modification_time(&metadata);

    Utc.timestamp_opt(mtime.unix_seconds(), mtime.nanoseconds())
        .single()
        .with_context(|| format!("Bundle mtime out of range: {}", app_path.display()))
}

/// Read a top-level string key from `Contents/Info.plist`
fn read_info_plist_key(app_path: &Path, key: &str) -> Option<String> {
    let plist_path = app_path.join("Contents/Info.plist");
    if !plist_path.exists() {
        return None;
    }

    let output = Command::new(PLIST_BUDDY)
        .args(["-c", &format!("Print :{}", key), plist_path.to_str()?])
        .output()
        .ok()?;

    if output.status.success() {
        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !value.is_empty() {
            return Some(value);
        }
    }
    None
}
