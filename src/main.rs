use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

use menukeys::config::{load_config, load_config_from, Config};
use menukeys::coordinator::ShortcutState;
use menukeys::menu_cache::CacheManager;
use menukeys::model::ShortcutEntry;
use menukeys::recent_apps::RecentApp;
use menukeys::logging;

/// Upper bound for a one-shot scan, retries included
const SCAN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "menukeys")]
#[command(version)]
#[command(about = "Shows the keyboard shortcuts of macOS applications, read from their menu bars", long_about = None)]
struct Cli {
    /// Path to configuration file (default: ~/.menukeys/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Debug-level logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Follow the frontmost application and print its shortcuts on every switch
    Watch,
    /// Read the shortcuts of a running application
    Scan {
        /// Bundle identifier, e.g. com.apple.Safari
        bundle_id: String,
        /// Ignore any cached result and walk the menus again
        #[arg(long)]
        refresh: bool,
    },
    /// Inspect or modify the shortcut cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Check (or request) the Accessibility permission
    Permission {
        /// Show the system prompt if not yet granted
        #[arg(long)]
        prompt: bool,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Entry count and age range
    Stats,
    /// Remove every cached entry
    Clear,
    /// Remove the entry of one application
    Invalidate { bundle_id: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init(cli.verbose);

    let config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    };

    match cli.command {
        Commands::Cache { action } => run_cache(&config, action, cli.json),
        Commands::Scan { bundle_id, refresh } => live::scan(&config, &bundle_id, refresh, cli.json),
        Commands::Watch => live::watch(&config, cli.json),
        Commands::Permission { prompt } => live::permission(prompt, cli.json),
    }
}

fn open_cache(config: &Config) -> CacheManager {
    CacheManager::open(config.cache_path(), config.retention())
}

fn run_cache(config: &Config, action: CacheAction, as_json: bool) -> Result<()> {
    let cache = open_cache(config);

    match action {
        CacheAction::Stats => {
            let stats = cache.stats();
            if as_json {
                let value = json!({
                    "path": cache.file_path(),
                    "totalEntries": stats.total_entries,
                    "oldestEntry": stats.oldest_entry,
                    "newestEntry": stats.newest_entry,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("Cache file:  {}", cache.file_path().display());
                println!("Entries:     {}", stats.total_entries);
                if let (Some(oldest), Some(newest)) = (stats.oldest_entry, stats.newest_entry) {
                    println!("Oldest:      {}", oldest.to_rfc3339());
                    println!("Newest:      {}", newest.to_rfc3339());
                }
            }
        }
        CacheAction::Clear => {
            let removed = cache.len();
            cache.clear_all();
            cache.flush();
            report(as_json, json!({ "cleared": removed }), &format!("Cleared {} entries", removed));
        }
        CacheAction::Invalidate { bundle_id } => {
            let existed = cache.contains(&bundle_id);
            cache.invalidate(&bundle_id);
            cache.flush();
            let message = if existed {
                format!("Invalidated {}", bundle_id)
            } else {
                format!("Nothing cached for {}", bundle_id)
            };
            report(
                as_json,
                json!({ "bundleID": bundle_id, "invalidated": existed }),
                &message,
            );
        }
    }
    Ok(())
}

fn report(as_json: bool, value: serde_json::Value, text: &str) {
    if as_json {
        println!("{}", value);
    } else {
        println!("{}", text);
    }
}

fn print_state(state: &ShortcutState, recent: &[RecentApp], as_json: bool) -> Result<()> {
    if as_json {
        let value = json!({
            "target": state.target,
            "fromCache": state.from_cache,
            "error": state.last_error.as_ref().map(|e| e.to_string()),
            "shortcuts": state.shortcuts,
            "recentApps": recent,
        });
        println!("{}", serde_json::to_string(&value).context("Failed to serialize state")?);
        return Ok(());
    }

    if let Some(target) = &state.target {
        let source = if state.from_cache { " (cached)" } else { "" };
        println!("== {} [{}]{}", target.name, target.bundle_id, source);
    }
    if let Some(error) = state.last_error.as_ref().filter(|e| e.is_user_visible()) {
        println!("   {}", error.user_message());
    }
    print_shortcuts(&state.shortcuts);
    if !recent.is_empty() {
        let names: Vec<&str> = recent.iter().map(|r| r.app.name.as_str()).collect();
        println!("   recent: {}", names.join(", "));
    }
    Ok(())
}

/// Grouped by top-level menu, in walk order
fn print_shortcuts(shortcuts: &[ShortcutEntry]) {
    let mut current_group: Option<&str> = None;
    for entry in shortcuts {
        if entry.group() != current_group {
            current_group = entry.group();
            println!("{}", current_group.unwrap_or("?"));
        }
        let label = entry.shortcut_label.as_deref().unwrap_or("");
        let disabled = if entry.enabled { "" } else { "  (disabled)" };
        println!("  {:<12} {}{}", label, entry.full_path(), disabled);
    }
}

#[cfg(target_os = "macos")]
mod live {
    use super::*;
    use anyhow::{anyhow, bail};
    use menukeys::coordinator::ReadCoordinator;
    use menukeys::error::ScanError;
    use menukeys::frontmost_app_tracker;
    use menukeys::menu_bar::{
        find_running, has_accessibility_permission, request_accessibility_permission, AxHost,
    };
    use menukeys::model::TargetApp;
    use menukeys::recent_apps::RecentApps;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::thread;
    use tracing::info;

    fn coordinator(config: &Config) -> ReadCoordinator<AxHost> {
        ReadCoordinator::new(
            Arc::new(AxHost::new()),
            Arc::new(open_cache(config)),
            Arc::new(has_accessibility_permission),
            config.walk_options(),
        )
    }

    pub fn scan(config: &Config, bundle_id: &str, refresh: bool, as_json: bool) -> Result<()> {
        let app = find_running(bundle_id).ok_or_else(|| ScanError::ApplicationNotFound {
            bundle_id: bundle_id.to_string(),
        })?;

        let coordinator = coordinator(config);
        if refresh {
            coordinator.cache().invalidate(bundle_id);
        }
        coordinator.scan_specific(app);
        if !coordinator.wait_for_idle(SCAN_TIMEOUT) {
            bail!("Timed out reading menus of {}", bundle_id);
        }
        coordinator.cache().flush();

        let state = coordinator.state();
        print_state(&state, &[], as_json)?;
        match state.last_error {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    pub fn watch(config: &Config, as_json: bool) -> Result<()> {
        if !has_accessibility_permission() {
            bail!(ScanError::PermissionDenied.user_message());
        }

        let coordinator = coordinator(config);
        let recent = Arc::new(Mutex::new(RecentApps::new(&config.recent_apps)));
        let updates = coordinator.subscribe();

        let on_activate = {
            let coordinator = coordinator.clone();
            let recent = recent.clone();
            move |app: TargetApp| {
                recent.lock().record(&app);
                coordinator.on_focus_changed(app);
            }
        };

        // The main thread belongs to the AppKit run loop; print elsewhere
        let printer = {
            let recent = recent.clone();
            thread::Builder::new()
                .name("shortcut-printer".to_string())
                .spawn(move || -> Result<()> {
                    while let Ok(state) = updates.recv_blocking() {
                        if state.is_scanning {
                            continue;
                        }
                        let recent: Vec<RecentApp> = recent.lock().iter().cloned().collect();
                        print_state(&state, &recent, as_json)?;
                    }
                    Ok(())
                })
                .context("Failed to spawn printer thread")?
        };

        if !frontmost_app_tracker::start_tracking(
            config.recent_apps.ignored_bundle_ids.clone(),
            on_activate,
        ) {
            bail!("Could not observe application switches");
        }
        info!("Watching for application switches");

        frontmost_app_tracker::run_event_loop_while(|| !printer.is_finished());
        printer
            .join()
            .map_err(|_| anyhow!("Printer thread panicked"))?
    }

    pub fn permission(prompt: bool, as_json: bool) -> Result<()> {
        let granted = if prompt {
            request_accessibility_permission()
        } else {
            has_accessibility_permission()
        };
        let text = if granted {
            "Accessibility permission granted".to_string()
        } else {
            ScanError::PermissionDenied.user_message()
        };
        report(as_json, json!({ "granted": granted }), &text);
        Ok(())
    }
}

#[cfg(not(target_os = "macos"))]
mod live {
    use super::*;
    use anyhow::bail;

    pub fn scan(_config: &Config, _bundle_id: &str, _refresh: bool, _as_json: bool) -> Result<()> {
        bail!("Reading menus requires macOS")
    }

    pub fn watch(_config: &Config, _as_json: bool) -> Result<()> {
        bail!("Watching application switches requires macOS")
    }

    pub fn permission(_prompt: bool, _as_json: bool) -> Result<()> {
        bail!("Accessibility permission is a macOS concept")
    }
}
