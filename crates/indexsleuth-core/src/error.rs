/// Error types for the indexing engine.
///
/// Two tiers:
/// - [`IndexError`] — whole-operation failures (bad root, snapshot write
///   failed in every location, cancellation). These stop the operation.
/// - [`AccessError`] — a single path could not be read. These never stop a
///   walk; the walker folds them into the `Forbidden` set and carries on.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Shared `Result` alias for the core crate.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Whole-operation failure.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("root path does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("root path is not a directory: {0}")]
    RootNotDirectory(PathBuf),

    #[error("root directory cannot be read: {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("snapshot could not be written (primary: {primary}; fallback: {fallback})")]
    SnapshotWrite { primary: String, fallback: String },

    #[error("worker thread failure: {0}")]
    Worker(String),

    #[error("scan cancelled")]
    Cancelled,
}

impl IndexError {
    /// Convenience constructor for I/O errors with a known path.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for `serde_json` failures.
    pub fn serialization(context: &'static str, err: impl fmt::Display) -> Self {
        Self::Serialization {
            context,
            details: err.to_string(),
        }
    }
}

/// Classification of a per-path read failure.
///
/// This is what gets persisted in the forbidden snapshot, so the serialised
/// names are part of the on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessErrorKind {
    PermissionDenied,
    NotFound,
    SymlinkLoop,
    NotAFile,
    IoError,
}

impl AccessErrorKind {
    /// Stable snake_case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::SymlinkLoop => "symlink_loop",
            Self::NotAFile => "not_a_file",
            Self::IoError => "io_error",
        }
    }

    /// Map an `io::Error` onto the classification.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::NotFound => Self::NotFound,
            // ELOOP has no stable ErrorKind; match the raw errno on unix.
            _ if is_loop_errno(err) => Self::SymlinkLoop,
            _ => Self::IoError,
        }
    }
}

impl fmt::Display for AccessErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
const ELOOP: i32 = 40;
#[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
const ELOOP: i32 = 62;

#[cfg(unix)]
fn is_loop_errno(err: &io::Error) -> bool {
    err.raw_os_error() == Some(ELOOP)
}

#[cfg(not(unix))]
fn is_loop_errno(_err: &io::Error) -> bool {
    false
}

/// A single path could not be read.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot read {path}: {kind} ({message})")]
pub struct AccessError {
    pub path: PathBuf,
    pub kind: AccessErrorKind,
    pub message: String,
}

impl AccessError {
    pub fn new(path: impl AsRef<Path>, kind: AccessErrorKind, message: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            kind,
            message: message.into(),
        }
    }

    /// Build from an `io::Error`, classifying it.
    pub fn from_io(path: impl AsRef<Path>, err: &io::Error) -> Self {
        Self::new(path, AccessErrorKind::from_io(err), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_are_classified() {
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        let missing = io::Error::from(io::ErrorKind::NotFound);
        let other = io::Error::new(io::ErrorKind::Other, "boom");
        assert_eq!(AccessErrorKind::from_io(&denied), AccessErrorKind::PermissionDenied);
        assert_eq!(AccessErrorKind::from_io(&missing), AccessErrorKind::NotFound);
        assert_eq!(AccessErrorKind::from_io(&other), AccessErrorKind::IoError);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn eloop_is_a_symlink_loop() {
        let err = io::Error::from_raw_os_error(40);
        assert_eq!(AccessErrorKind::from_io(&err), AccessErrorKind::SymlinkLoop);
    }

    #[test]
    fn kind_labels_match_serde_names() {
        for kind in [
            AccessErrorKind::PermissionDenied,
            AccessErrorKind::NotFound,
            AccessErrorKind::SymlinkLoop,
            AccessErrorKind::NotAFile,
            AccessErrorKind::IoError,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn access_error_display_names_path_and_kind() {
        let err = AccessError::new("/x/y", AccessErrorKind::PermissionDenied, "denied");
        let text = err.to_string();
        assert!(text.contains("/x/y"));
        assert!(text.contains("permission_denied"));
    }
}
