//! Recently activated applications
//!
//! Most-recent-first list of the applications the user switched to, so their
//! shortcuts can be inspected later with `ReadCoordinator::scan_specific`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

use crate::config::RecentAppsConfig;
use crate::model::TargetApp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentApp {
    pub app: TargetApp,
    pub last_activated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RecentApps {
    apps: VecDeque<RecentApp>,
    max_apps: usize,
    ignored: Vec<String>,
}

impl RecentApps {
    pub fn new(config: &RecentAppsConfig) -> Self {
        Self {
            apps: VecDeque::with_capacity(config.max_apps),
            max_apps: config.max_apps.max(1),
            ignored: config.ignored_bundle_ids.clone(),
        }
    }

    /// Record an activation. Returns false when the app was skipped.
    pub fn record(&mut self, app: &TargetApp) -> bool {
        if app.bundle_id.is_empty() || self.ignored.iter().any(|id| *id == app.bundle_id) {
            return false;
        }

        self.apps.retain(|recent| recent.app.bundle_id != app.bundle_id);
        self.apps.push_front(RecentApp {
            app: app.clone(),
            last_activated: Utc::now(),
        });
        self.apps.truncate(self.max_apps);

        debug!(
            bundle_id = %app.bundle_id,
            total = self.apps.len(),
            "Added to recent apps"
        );
        true
    }

    pub fn get(&self, bundle_id: &str) -> Option<&RecentApp> {
        self.apps.iter().find(|recent| recent.app.bundle_id == bundle_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecentApp> {
        self.apps.iter()
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    pub fn clear(&mut self) {
        self.apps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SELF_BUNDLE_ID;

    fn app(bundle_id: &str) -> TargetApp {
        TargetApp::new(bundle_id, bundle_id, 100)
    }

    fn order(recent: &RecentApps) -> Vec<String> {
        recent.iter().map(|r| r.app.bundle_id.clone()).collect()
    }

    #[test]
    fn test_most_recent_first_without_duplicates() {
        let mut recent = RecentApps::new(&RecentAppsConfig::default());
        recent.record(&app("a"));
        recent.record(&app("b"));
        recent.record(&app("a"));
        assert_eq!(order(&recent), vec!["a", "b"]);
    }

    #[test]
    fn test_trimmed_to_max() {
        let config = RecentAppsConfig {
            max_apps: 3,
            ..RecentAppsConfig::default()
        };
        let mut recent = RecentApps::new(&config);
        for id in ["a", "b", "c", "d", "e"] {
            recent.record(&app(id));
        }
        assert_eq!(order(&recent), vec!["e", "d", "c"]);
    }

    #[test]
    fn test_skips_self_and_empty_bundle_ids() {
        let mut recent = RecentApps::new(&RecentAppsConfig::default());
        assert!(!recent.record(&app(SELF_BUNDLE_ID)));
        assert!(!recent.record(&app("")));
        assert!(recent.is_empty());
    }

    #[test]
    fn test_get_and_clear() {
        let mut recent = RecentApps::new(&RecentAppsConfig::default());
        recent.record(&app("com.apple.Mail"));
        assert_eq!(recent.get("com.apple.Mail").unwrap().app.pid, 100);
        recent.clear();
        assert!(recent.get("com.apple.Mail").is_none());
    }
}
