//! Frontmost Application Tracker
//!
//! Watches `NSWorkspaceDidActivateApplicationNotification` and forwards each
//! newly activated application to a callback, usually
//! `ReadCoordinator::on_focus_changed`.
//!
//! AppKit delivers workspace notifications through the main run loop, so the
//! observer is registered from the main thread and that thread then has to
//! spin [`run_event_loop_while`].
//!
//! Activations of our own process and of configured bundle ids are ignored,
//! and so are repeat activations of the application already tracked.
//!
//! ## Usage
//!
//! ```ignore
//! let coordinator = coordinator.clone();
//! start_tracking(config.recent_apps.ignored_bundle_ids.clone(), move |app| {
//!     coordinator.on_focus_changed(app);
//! });
//! run_event_loop_while(|| !printer.is_finished());
//! ```

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SELF_BUNDLE_ID;
use crate::model::TargetApp;

type ActivationCallback = Arc<dyn Fn(TargetApp) + Send + Sync>;

#[derive(Default)]
struct TrackerState {
    /// Last application forwarded to the callback
    last_app: Option<TargetApp>,
    ignored: Vec<String>,
    callback: Option<ActivationCallback>,
}

impl TrackerState {
    /// Update the tracked app; returns true when the activation should be forwarded
    fn record(&mut self, app: &TargetApp) -> bool {
        if app.bundle_id.is_empty()
            || app.bundle_id == SELF_BUNDLE_ID
            || self.ignored.iter().any(|id| *id == app.bundle_id)
        {
            debug!(bundle_id = %app.bundle_id, "Ignoring activation");
            return false;
        }

        let changed = self
            .last_app
            .as_ref()
            .map(|last| last.bundle_id != app.bundle_id)
            .unwrap_or(true);
        if changed {
            self.last_app = Some(app.clone());
        }
        changed
    }
}

static TRACKER_STATE: LazyLock<RwLock<TrackerState>> =
    LazyLock::new(|| RwLock::new(TrackerState::default()));

static TRACKING_STARTED: AtomicBool = AtomicBool::new(false);

/// The application most recently forwarded to the callback
pub fn last_active_app() -> Option<TargetApp> {
    TRACKER_STATE.read().last_app.clone()
}

/// Route an activation through the filters and on to the callback
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn handle_activation(app: TargetApp) {
    let callback = {
        let mut state = TRACKER_STATE.write();
        if !state.record(&app) {
            return;
        }
        state.callback.clone()
    };

    info!(
        bundle_id = %app.bundle_id,
        name = %app.name,
        pid = app.pid,
        "Application activated"
    );
    if let Some(callback) = callback {
        callback(app);
    }
}

/// Register the activation observer. Call from the main thread.
///
/// The current menu bar owner is reported immediately. Subsequent calls are
/// no-ops and return false.
#[cfg(target_os = "macos")]
pub fn start_tracking<F>(ignored: Vec<String>, on_activate: F) -> bool
where
    F: Fn(TargetApp) + Send + Sync + 'static,
{
    if TRACKING_STARTED.swap(true, Ordering::SeqCst) {
        return false;
    }

    {
        let mut state = TRACKER_STATE.write();
        state.ignored = ignored;
        state.callback = Some(Arc::new(on_activate));
    }

    info!("Starting frontmost app tracker");

    if let Some(app) = crate::menu_bar::menu_bar_owner() {
        handle_activation(app);
    }

    if !observer::register() {
        TRACKING_STARTED.store(false, Ordering::SeqCst);
        return false;
    }
    true
}

/// Spin the main run loop until `keep_running` returns false.
///
/// Activation callbacks fire from inside this loop, on the main thread.
#[cfg(target_os = "macos")]
pub fn run_event_loop_while(keep_running: impl Fn() -> bool) {
    drive_while(keep_running, observer::run_once, std::thread::sleep);
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
const EVENT_LOOP_SLICE: Duration = Duration::from_millis(250);

/// Alternate `run_slice` with `keep_running` checks; `idle` covers slices
/// that returned at once because the loop had nothing to wait on
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn drive_while(
    keep_running: impl Fn() -> bool,
    mut run_slice: impl FnMut(Duration) -> bool,
    mut idle: impl FnMut(Duration),
) {
    while keep_running() {
        if !run_slice(EVENT_LOOP_SLICE) {
            idle(EVENT_LOOP_SLICE);
        }
    }
}

#[cfg(not(target_os = "macos"))]
pub fn start_tracking<F>(_ignored: Vec<String>, _on_activate: F) -> bool
where
    F: Fn(TargetApp) + Send + Sync + 'static,
{
    if !TRACKING_STARTED.swap(true, Ordering::SeqCst) {
        info!("Frontmost app tracking not available on this platform");
    }
    false
}

#[cfg(target_os = "macos")]
mod observer {
    use objc::declare::ClassDecl;
    use objc::runtime::{Class, Object, Sel, BOOL, NO};
    use objc::{msg_send, sel, sel_impl};
    use std::os::raw::c_void;
    use std::time::Duration;
    use tracing::{info, warn};

    use crate::menu_bar::{objc_nsstring, target_from_running_app};

    const OBSERVER_CLASS: &str = "MenuKeysAppObserver";

    // SAFETY: invoked from Objective-C on the main run loop.
    // Panics must not unwind across the FFI boundary.
    extern "C" fn handle_app_activation(_this: &Object, _sel: Sel, notification: *mut Object) {
        let _ = std::panic::catch_unwind(|| {
            objc::rc::autoreleasepool(|| unsafe { handle_app_activation_inner(notification) });
        });
    }

    /// # Safety
    /// Must be called within an autoreleasepool; `notification` must be
    /// null or a valid NSNotification
    unsafe fn handle_app_activation_inner(notification: *mut Object) {
        if notification.is_null() {
            return;
        }
        let user_info: *mut Object = msg_send![notification, userInfo];
        if user_info.is_null() {
            return;
        }
        let Some(key) = objc_nsstring("NSWorkspaceApplicationKey") else {
            return;
        };
        let app: *mut Object = msg_send![user_info, objectForKey: key];

        if let Some(target) = target_from_running_app(app) {
            super::handle_activation(target);
        }
    }

    /// Add the observer to the shared workspace notification center
    pub(super) fn register() -> bool {
        unsafe {
            let Some(superclass) = Class::get("NSObject") else {
                warn!("NSObject class unavailable, focus tracking disabled");
                return false;
            };
            let Some(mut decl) = ClassDecl::new(OBSERVER_CLASS, superclass) else {
                warn!("Observer class already registered");
                return false;
            };
            decl.add_method(
                sel!(handleAppActivation:),
                handle_app_activation as extern "C" fn(&Object, Sel, *mut Object),
            );
            let observer_class = decl.register();

            let observer: *mut Object = msg_send![observer_class, alloc];
            let observer: *mut Object = msg_send![observer, init];

            let Some(workspace_class) = Class::get("NSWorkspace") else {
                warn!("AppKit classes unavailable, focus tracking disabled");
                return false;
            };
            let workspace: *mut Object = msg_send![workspace_class, sharedWorkspace];
            let notification_center: *mut Object = msg_send![workspace, notificationCenter];

            let Some(name) = objc_nsstring("NSWorkspaceDidActivateApplicationNotification") else {
                return false;
            };
            let _: () = msg_send![
                notification_center,
                addObserver: observer
                selector: sel!(handleAppActivation:)
                name: name
                object: std::ptr::null::<c_void>()
            ];

            info!("NSWorkspace observer registered for app activation");
            true
        }
    }

    /// Run the main run loop in the default mode for at most `slice`.
    /// Returns false when the loop has no sources to wait on.
    pub(super) fn run_once(slice: Duration) -> bool {
        objc::rc::autoreleasepool(|| unsafe {
            let (Some(run_loop_class), Some(date_class)) =
                (Class::get("NSRunLoop"), Class::get("NSDate"))
            else {
                return false;
            };
            // NSDefaultRunLoopMode
            let Some(mode) = objc_nsstring("kCFRunLoopDefaultMode") else {
                return false;
            };
            let run_loop: *mut Object = msg_send![run_loop_class, mainRunLoop];
            let limit: *mut Object =
                msg_send![date_class, dateWithTimeIntervalSinceNow: slice.as_secs_f64()];
            let ran: BOOL = msg_send![run_loop, runMode: mode beforeDate: limit];
            ran != NO
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(bundle_id: &str) -> TargetApp {
        TargetApp::new(bundle_id, bundle_id, 77)
    }

    #[test]
    fn test_tracker_state_default() {
        let state = TrackerState::default();
        assert!(state.last_app.is_none());
        assert!(state.callback.is_none());
    }

    #[test]
    fn test_record_forwards_only_changes() {
        let mut state = TrackerState::default();
        assert!(state.record(&app("com.apple.Safari")));
        assert!(!state.record(&app("com.apple.Safari")));
        assert!(state.record(&app("com.apple.Notes")));
        assert_eq!(
            state.last_app.map(|a| a.bundle_id),
            Some("com.apple.Notes".to_string())
        );
    }

    #[test]
    fn test_record_skips_self_and_ignored() {
        let mut state = TrackerState {
            ignored: vec!["com.apple.dock".to_string()],
            ..Default::default()
        };
        assert!(!state.record(&app(SELF_BUNDLE_ID)));
        assert!(!state.record(&app("com.apple.dock")));
        assert!(!state.record(&app("")));
        assert!(state.last_app.is_none());
    }

    #[test]
    fn test_drive_while_stops_and_idles_on_empty_slices() {
        let checks = std::cell::Cell::new(0);
        let mut slices = Vec::new();
        let mut idles = 0;
        drive_while(
            || {
                checks.set(checks.get() + 1);
                checks.get() <= 3
            },
            |slice| {
                slices.push(slice);
                // Only the second slice finds no sources
                slices.len() != 2
            },
            |_| idles += 1,
        );
        assert_eq!(slices, vec![EVENT_LOOP_SLICE; 3]);
        assert_eq!(idles, 1);
    }
}
