//! Menu Cache Layer
//!
//! In-memory map `bundle_id -> CacheEntry` backed by a single JSON file in the
//! per-user data directory. Caches shortcut lists by bundle id so switching
//! back to an application that was already scanned doesn't walk its menus
//! again.
//!
//! ## Validity
//!
//! An entry is served only while the application's fingerprint (version,
//! bundle modification time, structural hash) still matches. Any mismatch
//! evicts the entry and forces a fresh scan.
//!
//! ## Persistence
//!
//! Every mutation hands a snapshot of the whole map to a background writer
//! thread, still under the map lock, so the writer sees them in order. The writer coalesces queued snapshots and writes atomically
//! (temp file + rename). Load happens once at startup; unreadable files and
//! unparseable records are treated as "no cache".

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, instrument, warn};

use crate::config::DEFAULT_CACHE_RETENTION_DAYS;
use crate::error::{ResultExt, ScanError};
use crate::model::{AppFingerprint, CacheEntry, ShortcutEntry};

/// Snapshot of cache contents for display/debugging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

enum PersistCommand {
    Write(Vec<CacheEntry>),
    Flush(Sender<()>),
}

/// Owner of the shortcut cache; the only writer of the map and the file
pub struct CacheManager {
    entries: Mutex<HashMap<String, CacheEntry>>,
    file_path: PathBuf,
    retention: Duration,
    persist_tx: Mutex<Option<Sender<PersistCommand>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl CacheManager {
    /// Create an empty cache persisting to `file_path` and start its writer thread
    pub fn new(file_path: impl Into<PathBuf>, retention: Duration) -> Self {
        let file_path = file_path.into();
        let (tx, rx) = mpsc::channel();

        let writer_path = file_path.clone();
        let writer = thread::Builder::new()
            .name("menu-cache-writer".to_string())
            .spawn(move || run_writer(writer_path, rx))
            .log_err();

        Self {
            entries: Mutex::new(HashMap::new()),
            file_path,
            retention,
            persist_tx: Mutex::new(writer.as_ref().map(|_| tx)),
            writer: Mutex::new(writer),
        }
    }

    /// Create the cache and load what's on disk
    pub fn open(file_path: impl Into<PathBuf>, retention: Duration) -> Self {
        let cache = Self::new(file_path, retention);
        cache.load();
        cache
    }

    pub fn with_default_retention(file_path: impl Into<PathBuf>) -> Self {
        Self::new(file_path, Duration::days(DEFAULT_CACHE_RETENTION_DAYS))
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Load persisted entries (startup only).
    ///
    /// Entries cached longer ago than the retention window are dropped from
    /// memory; the file is left alone until the next mutation rewrites it.
    /// Returns the number of entries kept.
    #[instrument(name = "menu_cache_load", skip(self), fields(path = %self.file_path.display()))]
    pub fn load(&self) -> usize {
        let records = match read_cache_file(&self.file_path) {
            Ok(Some(records)) => records,
            Ok(None) => {
                info!("No cache file found, starting fresh");
                return 0;
            }
            Err(e) => {
                let err = ScanError::storage(&self.file_path, &e);
                warn!(error = %err, "Failed to load menu cache, starting empty");
                return 0;
            }
        };

        let cutoff = Utc::now() - self.retention;
        let mut expired = 0usize;
        let mut entries = self.entries.lock();
        for entry in records {
            if entry.cached_at < cutoff {
                expired += 1;
                continue;
            }
            entries.insert(entry.bundle_id().to_string(), entry);
        }

        info!(
            entry_count = entries.len(),
            expired,
            "Loaded menu cache entries from disk"
        );
        entries.len()
    }

    /// Cached shortcuts for `bundle_id` if the stored fingerprint still matches.
    ///
    /// A hit refreshes `last_accessed_at`; a mismatch evicts the entry.
    pub fn lookup(&self, bundle_id: &str, current: &AppFingerprint) -> Option<Vec<ShortcutEntry>> {
        let mut entries = self.entries.lock();

        let Some(cached) = entries.get_mut(bundle_id) else {
            debug!(bundle_id, "No cache found");
            return None;
        };

        if cached.fingerprint.matches(current) {
            cached.touch();
            debug!(
                bundle_id,
                shortcut_count = cached.shortcuts.len(),
                "Cache hit"
            );
            return Some(cached.shortcuts.clone());
        }

        info!(
            bundle_id,
            cached_version = %cached.fingerprint.version,
            current_version = %current.version,
            "Cache invalid, application changed"
        );
        entries.remove(bundle_id);
        None
    }

    /// Insert or replace the entry for `bundle_id` and persist in the background
    pub fn store(&self, bundle_id: &str, fingerprint: AppFingerprint, shortcuts: Vec<ShortcutEntry>) {
        let mut fingerprint = fingerprint;
        if fingerprint.bundle_id != bundle_id {
            warn!(
                bundle_id,
                fingerprint_bundle_id = %fingerprint.bundle_id,
                "Fingerprint bundle id differs from cache key, using cache key"
            );
            fingerprint.bundle_id = bundle_id.to_string();
        }

        let count = shortcuts.len();
        let mut entries = self.entries.lock();
        entries.insert(bundle_id.to_string(), CacheEntry::new(fingerprint, shortcuts));
        self.schedule_persist(&entries);
        debug!(bundle_id, shortcut_count = count, "Cached shortcuts");
    }

    pub fn invalidate(&self, bundle_id: &str) {
        let mut entries = self.entries.lock();
        if entries.remove(bundle_id).is_none() {
            debug!(bundle_id, "Nothing cached to invalidate");
        }
        self.schedule_persist(&entries);
        info!(bundle_id, "Invalidated cache");
    }

    pub fn clear_all(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.schedule_persist(&entries);
        info!("Cleared all menu cache entries");
    }

    pub fn contains(&self, bundle_id: &str) -> bool {
        self.entries.lock().contains_key(bundle_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of one entry, including its timestamps
    pub fn entry(&self, bundle_id: &str) -> Option<CacheEntry> {
        self.entries.lock().get(bundle_id).cloned()
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            total_entries: entries.len(),
            oldest_entry: entries.values().map(|e| e.cached_at).min(),
            newest_entry: entries.values().map(|e| e.cached_at).max(),
        }
    }

    /// Block until every scheduled write has reached disk
    pub fn flush(&self) {
        let Some(tx) = self.persist_tx.lock().clone() else {
            return;
        };
        let (ack_tx, ack_rx) = mpsc::channel();
        if tx.send(PersistCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Queue a snapshot of `entries`.
    ///
    /// Takes the map by its held guard so snapshots reach the writer in the
    /// order the mutations were applied.
    fn schedule_persist(&self, entries: &HashMap<String, CacheEntry>) {
        let snapshot = snapshot(entries);
        let guard = self.persist_tx.lock();
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(PersistCommand::Write(snapshot)).is_err() {
                    warn!("Menu cache writer stopped, change not persisted");
                }
            }
            None => {
                // No writer thread; write inline
                write_cache_file(&self.file_path, &snapshot).log_err();
            }
        }
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        // Closing the channel lets the writer drain and exit
        self.persist_tx.lock().take();
        if let Some(handle) = self.writer.lock().take() {
            let _ = handle.join();
        }
    }
}

fn snapshot(entries: &HashMap<String, CacheEntry>) -> Vec<CacheEntry> {
    let mut list: Vec<CacheEntry> = entries.values().cloned().collect();
    list.sort_by(|a, b| a.bundle_id().cmp(b.bundle_id()));
    list
}

fn run_writer(path: PathBuf, rx: Receiver<PersistCommand>) {
    while let Ok(command) = rx.recv() {
        match command {
            PersistCommand::Write(mut latest) => {
                // Later snapshots supersede earlier ones; stop at a flush so it
                // is acknowledged after the write it follows
                let mut pending_flush = None;
                while let Ok(next) = rx.try_recv() {
                    match next {
                        PersistCommand::Write(snapshot) => latest = snapshot,
                        PersistCommand::Flush(ack) => {
                            pending_flush = Some(ack);
                            break;
                        }
                    }
                }
                if let Err(e) = write_cache_file(&path, &latest) {
                    let err = ScanError::storage(&path, &e);
                    warn!(error = %err, "Failed to save menu cache");
                }
                if let Some(ack) = pending_flush {
                    let _ = ack.send(());
                }
            }
            PersistCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("Menu cache writer exiting");
}

/// Read the cache file; `Ok(None)` when it doesn't exist.
///
/// Records that don't match the current shape are skipped individually.
fn read_cache_file(path: &Path) -> Result<Option<Vec<CacheEntry>>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read menu cache: {}", path.display()))?;
    let raw: Vec<serde_json::Value> =
        serde_json::from_str(&content).context("Menu cache is not a JSON array")?;

    let total = raw.len();
    let entries: Vec<CacheEntry> = raw
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).warn_on_err())
        .collect();

    if entries.len() < total {
        warn!(
            dropped = total - entries.len(),
            "Dropped unreadable menu cache records"
        );
    }
    Ok(Some(entries))
}

/// Atomic write: temp file next to the target, then rename
fn write_cache_file(path: &Path, entries: &[CacheEntry]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(entries).context("Failed to serialize menu cache")?;
    let temp_path = path.with_extension("json.tmp");

    std::fs::write(&temp_path, &json)
        .with_context(|| format!("Failed to write temp cache file: {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temp file to {}", path.display()))?;

    debug!(
        path = %path.display(),
        entry_count = entries.len(),
        bytes = json.len(),
        "Saved menu cache (atomic)"
    );
    Ok(())
}

#[cfg(test)]
#[path = "menu_cache_tests.rs"]
mod tests;
