use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, warn};

/// Failures of a menu read.
///
/// Never thrown past the coordinator: it publishes them as part of the state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("Accessibility permission not granted")]
    PermissionDenied,

    #[error("Menu bar of '{bundle_id}' is not accessible")]
    MenuBarInaccessible { bundle_id: String },

    #[error("Application '{bundle_id}' is no longer running")]
    ApplicationNotFound { bundle_id: String },

    #[error("Menu cache storage failed for '{path}': {message}")]
    StorageFailure { path: PathBuf, message: String },

    #[error("Menu walk of '{bundle_id}' aborted unexpectedly")]
    WalkAborted { bundle_id: String },

    #[error("Could not start menu scan worker: {0}")]
    WorkerSpawn(String),
}

impl ScanError {
    pub fn storage(path: impl Into<PathBuf>, err: &anyhow::Error) -> Self {
        Self::StorageFailure {
            path: path.into(),
            message: format!("{:#}", err),
        }
    }

    /// Whether the failure should reach the user at all
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::ApplicationNotFound { .. })
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied => {
                "Grant Accessibility access in System Settings > Privacy & Security".to_string()
            }
            Self::MenuBarInaccessible { .. } => "Could not access menu bar".to_string(),
            Self::ApplicationNotFound { .. } => "Could not find running application".to_string(),
            Self::StorageFailure { .. } => "Shortcut cache is unavailable".to_string(),
            Self::WalkAborted { .. } => "Could not read menus".to_string(),
            Self::WorkerSpawn(_) => "Could not start reading menus".to_string(),
        }
    }
}

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and user doesn't need to know.
///
/// # Examples
///
/// ```ignore
/// use menukeys::error::ResultExt;
///
/// // Log and continue if the cache file can't be written
/// cache_file.write(&entries).log_err();
///
/// // Log as warning for expected failures
/// let cached = read_cache().warn_on_err();
/// ```
pub trait ResultExt<T> {
    /// Log error with caller location and return None. Use for recoverable failures.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}
