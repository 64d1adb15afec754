use super::*;
use chrono::TimeZone;
use tempfile::TempDir;

/// Isolated cache file inside a temp dir
fn setup_cache() -> (TempDir, CacheManager) {
    let temp_dir = TempDir::new().expect("temp dir");
    let cache = CacheManager::with_default_retention(temp_dir.path().join("menu_cache.json"));
    (temp_dir, cache)
}

fn fingerprint(bundle_id: &str, version: &str) -> AppFingerprint {
    AppFingerprint::new(
        bundle_id,
        version,
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    )
}

fn create_test_shortcuts() -> Vec<ShortcutEntry> {
    vec![
        ShortcutEntry {
            title: "Window".to_string(),
            shortcut_label: Some("⌘⇧N".to_string()),
            menu_path: vec!["File".into(), "New".into(), "Window".into()],
            enabled: true,
            role_tag: "AXMenuItem".to_string(),
        },
        ShortcutEntry {
            title: "Close".to_string(),
            shortcut_label: Some("⌘W".to_string()),
            menu_path: vec!["File".into(), "Close".into()],
            enabled: false,
            role_tag: "AXMenuItem".to_string(),
        },
        ShortcutEntry {
            title: "Copy".to_string(),
            shortcut_label: Some("⌘C".to_string()),
            menu_path: vec!["Edit".into(), "Copy".into()],
            enabled: true,
            role_tag: "AXMenuItem".to_string(),
        },
    ]
}

#[test]
fn test_store_then_lookup_hits() {
    let (_dir, cache) = setup_cache();
    let fp = fingerprint("com.apple.Safari", "17.4");
    cache.store("com.apple.Safari", fp.clone(), create_test_shortcuts());

    let hit = cache.lookup("com.apple.Safari", &fp).expect("cache hit");
    assert_eq!(hit, create_test_shortcuts());
}

#[test]
fn test_lookup_miss_returns_none() {
    let (_dir, cache) = setup_cache();
    assert!(cache
        .lookup("com.nonexistent.App", &fingerprint("com.nonexistent.App", "1"))
        .is_none());
}

#[test]
fn test_lookup_hit_refreshes_access_time() {
    let (_dir, cache) = setup_cache();
    let fp = fingerprint("com.apple.Notes", "4.11");
    cache.store("com.apple.Notes", fp.clone(), create_test_shortcuts());
    let before = cache.entry("com.apple.Notes").unwrap().last_accessed_at;

    std::thread::sleep(std::time::Duration::from_millis(5));
    cache.lookup("com.apple.Notes", &fp).unwrap();

    let entry = cache.entry("com.apple.Notes").unwrap();
    assert!(entry.last_accessed_at > before);
    assert!(entry.cached_at <= before);
}

#[test]
fn test_lookup_each_field_mismatch_evicts() {
    let modified = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    let stored = AppFingerprint::new("com.example.App", "2.0", modified);

    let mut version_changed = stored.clone();
    version_changed.version = "2.1".to_string();

    let mut mtime_changed = stored.clone();
    mtime_changed.bundle_modification_time = modified + Duration::seconds(30);

    let mut hash_changed = stored.clone();
    hash_changed.structural_hash = "f".repeat(64);

    for current in [version_changed, mtime_changed, hash_changed] {
        let (_dir, cache) = setup_cache();
        cache.store("com.example.App", stored.clone(), create_test_shortcuts());
        assert!(cache.lookup("com.example.App", &current).is_none());
        assert!(!cache.contains("com.example.App"), "mismatch must evict");
        // The original fingerprint no longer hits either
        assert!(cache.lookup("com.example.App", &stored).is_none());
    }
}

#[test]
fn test_store_replaces_existing_entry() {
    let (_dir, cache) = setup_cache();
    cache.store(
        "com.google.Chrome",
        fingerprint("com.google.Chrome", "1.0"),
        create_test_shortcuts(),
    );
    let v2 = fingerprint("com.google.Chrome", "2.0");
    cache.store("com.google.Chrome", v2.clone(), create_test_shortcuts()[..1].to_vec());

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.lookup("com.google.Chrome", &v2).unwrap().len(), 1);
}

#[test]
fn test_invalidate_and_clear_all() {
    let (_dir, cache) = setup_cache();
    cache.store("a.app", fingerprint("a.app", "1"), create_test_shortcuts());
    cache.store("b.app", fingerprint("b.app", "1"), create_test_shortcuts());

    cache.invalidate("a.app");
    assert!(!cache.contains("a.app"));
    assert!(cache.contains("b.app"));

    cache.clear_all();
    assert!(cache.is_empty());

    cache.flush();
    let reloaded = CacheManager::open(cache.file_path(), Duration::days(30));
    assert!(reloaded.is_empty());
}

#[test]
fn test_persist_and_reload_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("menu_cache.json");
    let fp = fingerprint("com.apple.TextEdit", "1.19");

    {
        let cache = CacheManager::with_default_retention(&path);
        cache.store("com.apple.TextEdit", fp.clone(), create_test_shortcuts());
        cache.flush();
    }
    assert!(path.exists());
    assert!(!path.with_extension("json.tmp").exists());

    let reloaded = CacheManager::with_default_retention(&path);
    assert_eq!(reloaded.load(), 1);
    let shortcuts = reloaded.lookup("com.apple.TextEdit", &fp).expect("hit after reload");
    assert_eq!(shortcuts, create_test_shortcuts());
    assert_eq!(
        shortcuts[0].menu_path,
        vec!["File".to_string(), "New".to_string(), "Window".to_string()]
    );
}

#[test]
fn test_drop_flushes_pending_writes() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("menu_cache.json");
    {
        let cache = CacheManager::with_default_retention(&path);
        for i in 0..20 {
            cache.store(
                &format!("com.example.App{}", i),
                fingerprint(&format!("com.example.App{}", i), "1"),
                create_test_shortcuts(),
            );
        }
    }
    let reloaded = CacheManager::open(&path, Duration::days(30));
    assert_eq!(reloaded.len(), 20);
}

#[test]
fn test_retention_drops_old_entries_at_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("menu_cache.json");

    let stale_fp = fingerprint("com.example.Stale", "1");
    let fresh_fp = fingerprint("com.example.Fresh", "1");
    let mut stale = CacheEntry::new(stale_fp.clone(), create_test_shortcuts());
    stale.cached_at = Utc::now() - Duration::days(31);
    stale.last_accessed_at = stale.cached_at;
    let fresh = CacheEntry::new(fresh_fp.clone(), create_test_shortcuts());

    std::fs::write(&path, serde_json::to_string(&vec![stale, fresh]).unwrap()).unwrap();
    let before = std::fs::read_to_string(&path).unwrap();

    let cache = CacheManager::with_default_retention(&path);
    assert_eq!(cache.load(), 1);
    assert!(cache.lookup("com.example.Stale", &stale_fp).is_none());
    assert!(cache.lookup("com.example.Fresh", &fresh_fp).is_some());

    // Not written back until the next mutation
    cache.flush();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn test_corrupt_file_is_empty_cache() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("menu_cache.json");
    std::fs::write(&path, "{{{ definitely not json").unwrap();

    let cache = CacheManager::with_default_retention(&path);
    assert_eq!(cache.load(), 0);
    assert!(cache.is_empty());

    // Still usable afterwards
    cache.store("com.example.App", fingerprint("com.example.App", "1"), vec![]);
    cache.flush();
    assert_eq!(CacheManager::open(&path, Duration::days(30)).len(), 1);
}

#[test]
fn test_unparseable_records_are_dropped() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("menu_cache.json");
    let good = CacheEntry::new(fingerprint("com.example.Good", "1"), create_test_shortcuts());
    let json = format!(
        "[{}, {{\"fingerprint\": 42}}, {{\"unexpected\": true}}]",
        serde_json::to_string(&good).unwrap()
    );
    std::fs::write(&path, json).unwrap();

    let cache = CacheManager::with_default_retention(&path);
    assert_eq!(cache.load(), 1);
    assert!(cache.contains("com.example.Good"));
}

#[test]
fn test_missing_file_loads_nothing() {
    let (_dir, cache) = setup_cache();
    assert_eq!(cache.load(), 0);
}

#[test]
fn test_stats() {
    let (_dir, cache) = setup_cache();
    assert_eq!(
        cache.stats(),
        CacheStats {
            total_entries: 0,
            oldest_entry: None,
            newest_entry: None
        }
    );

    cache.store("a.app", fingerprint("a.app", "1"), vec![]);
    std::thread::sleep(std::time::Duration::from_millis(5));
    cache.store("b.app", fingerprint("b.app", "1"), vec![]);

    let stats = cache.stats();
    assert_eq!(stats.total_entries, 2);
    assert!(stats.oldest_entry.unwrap() < stats.newest_entry.unwrap());
    assert_eq!(stats.oldest_entry, cache.entry("a.app").map(|e| e.cached_at));
}

#[test]
fn test_store_normalizes_fingerprint_bundle_id() {
    let (_dir, cache) = setup_cache();
    cache.store("com.example.Key", fingerprint("com.example.Other", "1"), vec![]);
    assert_eq!(cache.entry("com.example.Key").unwrap().bundle_id(), "com.example.Key");
}

#[test]
fn test_concurrent_mutations_reach_disk_in_order() {
    let (_dir, cache) = setup_cache();
    let barrier = std::sync::Barrier::new(2);

    for i in 0..300 {
        let bundle_id = format!("com.example.Racer{}", i);
        std::thread::scope(|s| {
            s.spawn(|| {
                barrier.wait();
                cache.clear_all();
            });
            barrier.wait();
            cache.store(&bundle_id, fingerprint(&bundle_id, "1"), create_test_shortcuts());
        });
        cache.flush();

        let on_disk: Vec<String> = read_cache_file(cache.file_path())
            .expect("readable cache file")
            .unwrap_or_default()
            .iter()
            .map(|entry| entry.bundle_id().to_string())
            .collect();
        let in_memory: Vec<String> = cache
            .entry(&bundle_id)
            .map(|entry| entry.bundle_id().to_string())
            .into_iter()
            .collect();
        assert_eq!(on_disk, in_memory, "iteration {}", i);
    }
}
