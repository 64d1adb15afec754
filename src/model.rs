//! Data model shared by the walker, the cache and the coordinator.
//!
//! - [`ShortcutEntry`] - one menu command with a decoded shortcut
//! - [`AppFingerprint`] - identity + change detection for one application bundle
//! - [`CacheEntry`] - the persisted record for one bundle id
//! - [`TargetApp`] - the application a focus event (or an explicit request) points at

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// A menu command discovered in a foreign application's menu bar
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortcutEntry {
    /// Menu item title (never empty)
    pub title: String,
    /// Canonical display string, e.g. "⌘⇧N"
    pub shortcut_label: Option<String>,
    /// Titles from the top-level menu down to this item, e.g. ["File", "New", "Window"]
    pub menu_path: Vec<String>,
    /// Whether the command was enabled at scan time
    pub enabled: bool,
    /// Accessibility role of the underlying element (e.g. "AXMenuItem")
    pub role_tag: String,
}

impl ShortcutEntry {
    /// The menu path rendered for display, e.g. "File > New > Window"
    pub fn full_path(&self) -> String {
        self.menu_path.join(" > ")
    }

    /// The top-level menu this entry is grouped under
    pub fn group(&self) -> Option<&str> {
        self.menu_path.first().map(String::as_str)
    }

    pub fn has_shortcut(&self) -> bool {
        self.shortcut_label
            .as_deref()
            .map(|label| !label.is_empty())
            .unwrap_or(false)
    }
}

/// Bundle facts read from the running application, before hashing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleMetadata {
    pub version: String,
    pub modification_time: DateTime<Utc>,
}

/// Identity and change-detection key for one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppFingerprint {
    #[serde(rename = "bundleID")]
    pub bundle_id: String,
    pub version: String,
    pub bundle_modification_time: DateTime<Utc>,
    pub structural_hash: String,
}

impl AppFingerprint {
    /// Build a fingerprint, deriving the structural hash from the other fields
    pub fn new(
        bundle_id: impl Into<String>,
        version: impl Into<String>,
        bundle_modification_time: DateTime<Utc>,
    ) -> Self {
        let bundle_id = bundle_id.into();
        let version = version.into();
        let structural_hash = structural_hash(&bundle_id, &version, &bundle_modification_time);
        Self {
            bundle_id,
            version,
            bundle_modification_time,
            structural_hash,
        }
    }

    pub fn from_metadata(bundle_id: impl Into<String>, metadata: &BundleMetadata) -> Self {
        Self::new(bundle_id, metadata.version.clone(), metadata.modification_time)
    }

    /// Whether a cached scan taken under `self` is still valid for `current`.
    ///
    /// All three validity fields must match; the bundle id is the map key and
    /// is not compared here.
    pub fn matches(&self, current: &AppFingerprint) -> bool {
        self.version == current.version
            && self.bundle_modification_time == current.bundle_modification_time
            && self.structural_hash == current.structural_hash
    }
}

/// SHA-256 (hex) of `"{bundle_id}_{version}_{mtime}"`
pub fn structural_hash(bundle_id: &str, version: &str, modified: &DateTime<Utc>) -> String {
    let input = format!(
        "{}_{}_{}",
        bundle_id,
        version,
        modified.to_rfc3339_opts(SecondsFormat::Nanos, true)
    );
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Persisted cache record for one application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub fingerprint: AppFingerprint,
    pub shortcuts: Vec<ShortcutEntry>,
    pub cached_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(fingerprint: AppFingerprint, shortcuts: Vec<ShortcutEntry>) -> Self {
        let now = Utc::now();
        Self {
            fingerprint,
            shortcuts,
            cached_at: now,
            last_accessed_at: now,
        }
    }

    pub fn bundle_id(&self) -> &str {
        &self.fingerprint.bundle_id
    }

    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }
}

/// An application a read is issued for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetApp {
    /// Localized display name (e.g. "Safari")
    pub name: String,
    /// Bundle identifier, the cache and de-duplication key
    #[serde(rename = "bundleID")]
    pub bundle_id: String,
    /// Process id used to reach the accessibility tree
    pub pid: i32,
    /// Location of the application bundle on disk, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_path: Option<PathBuf>,
}

impl TargetApp {
    pub fn new(name: impl Into<String>, bundle_id: impl Into<String>, pid: i32) -> Self {
        Self {
            name: name.into(),
            bundle_id: bundle_id.into(),
            pid,
            bundle_path: None,
        }
    }

    pub fn with_bundle_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.bundle_path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn modified() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn test_fingerprint_hash_is_stable() {
        let a = AppFingerprint::new("com.apple.Safari", "17.4", modified());
        let b = AppFingerprint::new("com.apple.Safari", "17.4", modified());
        assert_eq!(a.structural_hash, b.structural_hash);
        assert_eq!(a.structural_hash.len(), 64);
        assert!(a.matches(&b));
    }

    #[test]
    fn test_fingerprint_hash_changes_with_inputs() {
        let base = AppFingerprint::new("com.apple.Safari", "17.4", modified());
        let new_version = AppFingerprint::new("com.apple.Safari", "17.5", modified());
        let touched = AppFingerprint::new(
            "com.apple.Safari",
            "17.4",
            modified() + chrono::Duration::seconds(1),
        );
        assert_ne!(base.structural_hash, new_version.structural_hash);
        assert_ne!(base.structural_hash, touched.structural_hash);
        assert!(!base.matches(&new_version));
        assert!(!base.matches(&touched));
    }

    #[test]
    fn test_fingerprint_mismatch_on_hash_alone() {
        let base = AppFingerprint::new("com.apple.Notes", "4.11", modified());
        let mut tampered = base.clone();
        tampered.structural_hash = "0".repeat(64);
        assert!(!base.matches(&tampered));
    }

    #[test]
    fn test_entry_helpers() {
        let entry = ShortcutEntry {
            title: "Window".to_string(),
            shortcut_label: Some("⌘⇧N".to_string()),
            menu_path: vec!["File".into(), "New".into(), "Window".into()],
            enabled: true,
            role_tag: "AXMenuItem".to_string(),
        };
        assert_eq!(entry.full_path(), "File > New > Window");
        assert_eq!(entry.group(), Some("File"));
        assert!(entry.has_shortcut());
    }

    #[test]
    fn test_cache_entry_serializes_camel_case() {
        let entry = CacheEntry::new(
            AppFingerprint::new("com.apple.TextEdit", "1.19", modified()),
            vec![],
        );
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"bundleID\":\"com.apple.TextEdit\""));
        assert!(json.contains("\"cachedAt\""));
        assert!(json.contains("\"lastAccessedAt\""));
        assert!(json.contains("\"bundleModificationTime\""));
    }
}
