//! Read Coordinator
//!
//! Single entry point for "which shortcuts should be shown right now". It
//! reacts to focus changes, serves the cache when the application hasn't
//! changed, and otherwise runs one menu walk at a time on a worker thread.
//!
//! ## Ordering
//!
//! Every walk remembers the bundle id it was issued for. When it finishes,
//! the result is published and cached only if that bundle is still the
//! current target; otherwise it is dropped. A request that arrives while a
//! walk is running doesn't start a second walk: it becomes the pending
//! request and runs when the current walk completes.
//!
//! ## Usage
//!
//! ```ignore
//! let coordinator = ReadCoordinator::new(host, cache, permission, WalkOptions::default());
//! let updates = coordinator.subscribe();
//! coordinator.on_focus_changed(TargetApp::new("Safari", "com.apple.Safari", pid));
//! ```

use async_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

use crate::error::ScanError;
use crate::menu_cache::CacheManager;
use crate::menu_tree::{AccessibilityHost, MenuWalker, PermissionGate, WalkOptions};
use crate::model::{AppFingerprint, ShortcutEntry, TargetApp};

/// The published view consumed by UI and export layers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShortcutState {
    /// Application the shortcuts belong to
    pub target: Option<TargetApp>,
    /// Ordered as produced by the walker
    pub shortcuts: Vec<ShortcutEntry>,
    /// A walk for `target` is running or queued
    pub is_scanning: bool,
    pub last_error: Option<ScanError>,
    /// `shortcuts` came from the cache rather than a fresh walk
    pub from_cache: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scanning,
}

#[derive(Debug)]
struct ScanRequest {
    target: TargetApp,
    /// None when bundle metadata was unavailable; the result is then not cached
    fingerprint: Option<AppFingerprint>,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    published: ShortcutState,
    /// What is being shown (or fetched) right now
    current_target: Option<TargetApp>,
    /// Focus de-duplication key
    last_focus_bundle_id: Option<String>,
    /// Bundle id of the running walk
    in_flight: Option<String>,
    /// Request waiting for the running walk to finish
    pending: Option<ScanRequest>,
}

struct Inner<H: AccessibilityHost> {
    walker: MenuWalker<H>,
    cache: Arc<CacheManager>,
    permission: Arc<dyn PermissionGate>,
    state: Mutex<CoordinatorState>,
    idle: Condvar,
    subscribers: Mutex<Vec<Sender<ShortcutState>>>,
}

/// Arbitrates between cached results and fresh menu walks
pub struct ReadCoordinator<H: AccessibilityHost> {
    inner: Arc<Inner<H>>,
}

impl<H: AccessibilityHost> Clone for ReadCoordinator<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: AccessibilityHost> ReadCoordinator<H> {
    pub fn new(
        host: Arc<H>,
        cache: Arc<CacheManager>,
        permission: Arc<dyn PermissionGate>,
        options: WalkOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                walker: MenuWalker::new(host, options),
                cache,
                permission,
                state: Mutex::new(CoordinatorState::default()),
                idle: Condvar::new(),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// An application became active.
    ///
    /// A repeat signal for the bundle that was last focused is ignored.
    #[instrument(skip(self, target), fields(bundle_id = %target.bundle_id))]
    pub fn on_focus_changed(&self, target: TargetApp) {
        self.inner.focus(target, false);
    }

    /// Drop the cached scan of the current target and read it again
    pub fn refresh(&self) {
        let target = {
            let mut state = self.inner.state.lock();
            let Some(target) = state.current_target.clone() else {
                debug!("Refresh requested with no current target");
                return;
            };
            state.last_focus_bundle_id = None;
            target
        };
        info!(bundle_id = %target.bundle_id, "Refreshing shortcuts");
        self.inner.cache.invalidate(&target.bundle_id);
        self.inner.focus(target, true);
    }

    /// Read shortcuts for any application, focused or not.
    ///
    /// Follows the cache-then-walk path but leaves focus de-duplication alone.
    #[instrument(skip(self, app), fields(bundle_id = %app.bundle_id))]
    pub fn scan_specific(&self, app: TargetApp) {
        let mut state = self.inner.state.lock();
        if !self.inner.permission.is_granted() {
            self.inner.deny(&mut state, app);
            return;
        }
        if self.inner.is_gone(&app) {
            return;
        }
        self.inner.serve(&mut state, app);
    }

    /// Empty the cache; the next focus event walks again
    pub fn clear_cache(&self) {
        self.inner.cache.clear_all();
        self.inner.state.lock().last_focus_bundle_id = None;
    }

    /// Current published state
    pub fn state(&self) -> ShortcutState {
        self.inner.state.lock().published.clone()
    }

    pub fn phase(&self) -> Phase {
        if self.inner.state.lock().in_flight.is_some() {
            Phase::Scanning
        } else {
            Phase::Idle
        }
    }

    /// Receive every state published from now on
    pub fn subscribe(&self) -> Receiver<ShortcutState> {
        let (tx, rx) = async_channel::unbounded();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    /// Block until no walk is running or queued. Returns false on timeout.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let mut state = self.inner.state.lock();
        let _ = self
            .inner
            .idle
            .wait_while_for(&mut state, |state| state.in_flight.is_some(), timeout);
        state.in_flight.is_none()
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.inner.cache
    }
}

impl<H: AccessibilityHost> Inner<H> {
    fn focus(self: &Arc<Self>, target: TargetApp, force: bool) {
        let mut state = self.state.lock();

        if !force && state.last_focus_bundle_id.as_deref() == Some(target.bundle_id.as_str()) {
            debug!(bundle_id = %target.bundle_id, "Same application as last read, skipping");
            return;
        }

        if !self.permission.is_granted() {
            // The key stays unset so the same app is read once access is granted
            if state.published.target.as_ref() == Some(&target)
                && state.published.last_error == Some(ScanError::PermissionDenied)
            {
                debug!(bundle_id = %target.bundle_id, "Permission still denied, skipping");
                return;
            }
            self.deny(&mut state, target);
            return;
        }

        // A gone process must not claim the key, or its relaunch would be skipped
        if self.is_gone(&target) {
            return;
        }
        state.last_focus_bundle_id = Some(target.bundle_id.clone());

        self.serve(&mut state, target);
    }

    /// Focus events for processes that no longer exist are dropped silently
    fn is_gone(&self, target: &TargetApp) -> bool {
        if self.walker.host().is_running(target) {
            return false;
        }
        let err = ScanError::ApplicationNotFound {
            bundle_id: target.bundle_id.clone(),
        };
        debug!(error = %err, "Ignoring focus event");
        true
    }

    fn deny(&self, state: &mut CoordinatorState, target: TargetApp) {
        info!(bundle_id = %target.bundle_id, "Accessibility permission not granted");
        state.pending = None;
        state.current_target = Some(target.clone());
        self.publish(
            state,
            ShortcutState {
                target: Some(target),
                shortcuts: Vec::new(),
                is_scanning: false,
                last_error: Some(ScanError::PermissionDenied),
                from_cache: false,
            },
        );
    }

    /// Cache-then-walk for a running `target`; caller holds the state lock
    fn serve(self: &Arc<Self>, state: &mut CoordinatorState, target: TargetApp) {
        let host = self.walker.host();
        state.current_target = Some(target.clone());

        let fingerprint = host
            .bundle_metadata(&target)
            .map(|metadata| AppFingerprint::from_metadata(target.bundle_id.clone(), &metadata));

        match &fingerprint {
            Some(fingerprint) => {
                if let Some(shortcuts) = self.cache.lookup(&target.bundle_id, fingerprint) {
                    info!(
                        bundle_id = %target.bundle_id,
                        shortcut_count = shortcuts.len(),
                        "Serving shortcuts from cache"
                    );
                    state.pending = None;
                    self.publish(
                        state,
                        ShortcutState {
                            target: Some(target),
                            shortcuts,
                            is_scanning: false,
                            last_error: None,
                            from_cache: true,
                        },
                    );
                    return;
                }
            }
            None => debug!(bundle_id = %target.bundle_id, "No bundle metadata, bypassing cache"),
        }

        self.publish(
            state,
            ShortcutState {
                target: Some(target.clone()),
                shortcuts: Vec::new(),
                is_scanning: true,
                last_error: None,
                from_cache: false,
            },
        );

        let request = ScanRequest {
            target,
            fingerprint,
        };
        match state.in_flight.as_deref() {
            Some(running) if running == request.target.bundle_id => {
                debug!(bundle_id = running, "Walk already running for this target");
                state.pending = None;
            }
            Some(running) => {
                debug!(
                    running,
                    queued = %request.target.bundle_id,
                    "Walk in progress, queueing request"
                );
                state.pending = Some(request);
            }
            None => self.start_scan(state, request),
        }
    }

    fn start_scan(self: &Arc<Self>, state: &mut CoordinatorState, request: ScanRequest) {
        let target = request.target.clone();
        state.in_flight = Some(target.bundle_id.clone());

        let inner = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("menu-walk".to_string())
            .spawn(move || {
                // complete() must run even if the host panics mid-walk
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    inner.walker.scan(&request.target)
                }))
                .unwrap_or_else(|_| {
                    error!(bundle_id = %request.target.bundle_id, "Menu walk panicked");
                    Err(ScanError::WalkAborted {
                        bundle_id: request.target.bundle_id.clone(),
                    })
                });
                inner.complete(request, result);
            });

        if let Err(e) = spawned {
            error!(error = %e, bundle_id = %target.bundle_id, "Failed to spawn menu walk");
            state.in_flight = None;
            self.publish(
                state,
                ShortcutState {
                    target: Some(target),
                    shortcuts: Vec::new(),
                    is_scanning: false,
                    last_error: Some(ScanError::WorkerSpawn(e.to_string())),
                    from_cache: false,
                },
            );
            self.idle.notify_all();
        }
    }

    fn complete(self: &Arc<Self>, request: ScanRequest, result: Result<Vec<ShortcutEntry>, ScanError>) {
        let mut state = self.state.lock();
        state.in_flight = None;

        let bundle_id = request.target.bundle_id.clone();
        let is_current = state
            .current_target
            .as_ref()
            .map(|current| current.bundle_id == bundle_id)
            .unwrap_or(false);

        if !is_current {
            info!(
                bundle_id = %bundle_id,
                current = ?state.current_target.as_ref().map(|t| t.bundle_id.as_str()),
                "Discarding stale scan result"
            );
        } else {
            let update = match result {
                Ok(shortcuts) => {
                    if let Some(fingerprint) = request.fingerprint {
                        self.cache.store(&bundle_id, fingerprint, shortcuts.clone());
                    }
                    ShortcutState {
                        target: Some(request.target),
                        shortcuts,
                        is_scanning: false,
                        last_error: None,
                        from_cache: false,
                    }
                }
                Err(e) => {
                    info!(bundle_id = %bundle_id, error = %e, "Menu scan failed");
                    ShortcutState {
                        target: Some(request.target),
                        shortcuts: Vec::new(),
                        is_scanning: false,
                        last_error: Some(e),
                        from_cache: false,
                    }
                }
            };
            self.publish(&mut state, update);
        }

        let pending = state.pending.take();
        match pending {
            Some(next)
                if state.current_target.as_ref().map(|t| &t.bundle_id)
                    == Some(&next.target.bundle_id) =>
            {
                self.start_scan(&mut state, next);
            }
            Some(next) => {
                debug!(bundle_id = %next.target.bundle_id, "Dropping outdated queued request");
                self.idle.notify_all();
            }
            None => {
                self.idle.notify_all();
            }
        }
    }

    fn publish(&self, state: &mut CoordinatorState, update: ShortcutState) {
        state.published = update;
        self.subscribers
            .lock()
            .retain(|tx| tx.try_send(state.published.clone()).is_ok());
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
