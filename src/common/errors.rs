use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::scanner::snapshot::TruncationReason;

/// Error taxonomy for scan, analysis and deletion.
///
/// Only `InvalidConfiguration` is fatal. Everything else is recovered where
/// it happens and folded into the scan stats, report or deletion log as text.
#[derive(Debug, Error)]
pub enum CleanError {
    /// Subtree or file could not be accessed
    #[error("Permission denied: '{}'", path.display())]
    PermissionDenied { path: PathBuf },

    /// Path was listed but disappeared before it could be inspected
    #[error("Entry vanished before it could be read: '{}'", path.display())]
    VanishedEntry { path: PathBuf },

    /// File is held open by another process
    #[error("File is locked by another process: '{}'", path.display())]
    LockConflict { path: PathBuf },

    /// Cache record exists but cannot be used
    #[error("Cache record for '{}' is unusable: {reason}", path.display())]
    CacheCorrupt { path: PathBuf, reason: String },

    /// A scan ceiling was reached and the snapshot is partial
    #[error("Scan stopped early ({reason})")]
    Truncated { reason: TruncationReason },

    /// Missing or malformed setting, detected before any scan starts
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Any other I/O failure
    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CleanError {
    /// Map an I/O error onto the taxonomy, keeping the path it happened at.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => CleanError::PermissionDenied {
                path: path.to_path_buf(),
            },
            io::ErrorKind::NotFound => CleanError::VanishedEntry {
                path: path.to_path_buf(),
            },
            _ => CleanError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// Convenience constructor for configuration failures
    pub fn config(message: impl Into<String>) -> Self {
        CleanError::InvalidConfiguration(message.into())
    }

    /// Whether this error aborts the run
    pub fn is_fatal(&self) -> bool {
        matches!(self, CleanError::InvalidConfiguration(_))
    }
}
