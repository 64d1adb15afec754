//! Structured JSONL logging plus human-readable stderr output.
//!
//! - **JSONL to file** (`~/.menukeys/logs/menukeys.jsonl`) - one JSON object per line
//! - **Compact to stderr** - for whoever is watching the terminal
//!
//! # Usage
//!
//! ```rust,ignore
//! // Keep the guard alive for the duration of the program
//! let _guard = menukeys::logging::init(false);
//!
//! tracing::info!(bundle_id = "com.apple.Safari", shortcut_count = 42, "Scan complete");
//! ```
//!
//! # JSONL Output Format
//!
//! ```json
//! {"timestamp":"2025-06-01T10:30:45.123Z","level":"INFO","target":"menukeys::coordinator","fields":{"message":"Serving shortcuts from cache","bundle_id":"com.apple.Safari","shortcut_count":42}}
//! ```

use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use time::format_description::well_known::Rfc3339;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::APP_DIR_NAME;

const LOG_FILE_NAME: &str = "menukeys.jsonl";
const DEFAULT_FILTER: &str = "info";

/// Dropping this guard flushes and closes the log file.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// `verbose` lowers the default level to `debug`; `RUST_LOG` still wins.
/// If the log file can't be opened, logging continues on stderr only.
pub fn init(verbose: bool) -> LoggingGuard {
    let log_path = log_path();
    if let Some(dir) = log_path.parent() {
        if let Err(e) = fs::create_dir_all(dir) {
            eprintln!("[LOGGING] Failed to create log directory: {}", e);
        }
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| eprintln!("[LOGGING] Failed to open log file: {}", e))
        .ok();

    let (json_layer, file_guard) = match file {
        Some(file) => {
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .json()
                .with_writer(non_blocking_file)
                .with_timer(fmt::time::UtcTime::new(Rfc3339))
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false)
                .with_span_events(FmtSpan::NONE);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let default_filter = if verbose { "debug" } else { DEFAULT_FILTER };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(stderr_layer)
        .init();

    tracing::debug!(
        event_type = "app_lifecycle",
        action = "started",
        log_path = %log_path.display(),
        "Logging initialized"
    );

    LoggingGuard {
        _file_guard: file_guard,
    }
}

/// `~/.menukeys/logs/`, or a temp directory without a home
fn log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(format!(".{}", APP_DIR_NAME)).join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join(format!("{}-logs", APP_DIR_NAME)))
}

/// Path of the JSONL log file
pub fn log_path() -> PathBuf {
    log_dir().join(LOG_FILE_NAME)
}
