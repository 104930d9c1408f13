//! Error types for treemirror.
//!
//! This module provides the [`Error`] enum containing every failure the
//! engine can produce, and the [`Result`] type alias.
//!
//! # Error Categories
//!
//! | Category | Errors |
//! |----------|--------|
//! | IO | [`Error::Io`], [`Error::TempFile`], [`Error::Persist`] |
//! | Validation | [`Error::SourceNotFound`], [`Error::NotADirectory`] |
//! | Partial | [`Error::PartialCopy`], [`Error::NoSpace`] |
//! | Configuration | [`Error::MissingSetting`], [`Error::InvalidSetting`], [`Error::NotAbsolute`] |
//! | Audit trail | [`Error::LogSink`] |
//! | Runtime | [`Error::Watch`], [`Error::Join`] |
//!
//! Only configuration errors (see [`Error::is_configuration`]) and a
//! [`Error::LogSink`] raised by the first append are meant to stop the
//! process. Everything else is
//! converted into an activity log line at the boundary of the operation that
//! raised it.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for treemirror operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Check if an IO error indicates "no space left on device".
///
/// # Platform Support
///
/// | Platform | Error Detection |
/// |----------|-----------------|
/// | Unix | `ENOSPC` (errno 28) |
/// | Windows | `ERROR_DISK_FULL` (0x70) |
pub fn is_no_space_error(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::StorageFull {
        return true;
    }

    #[cfg(unix)]
    {
        // The raw OS error might be available even if kind() isn't StorageFull
        if let Some(raw_error) = error.raw_os_error() {
            const ENOSPC: i32 = 28;
            return raw_error == ENOSPC;
        }
    }

    #[cfg(windows)]
    {
        if let Some(raw_error) = error.raw_os_error() {
            const ERROR_DISK_FULL: i32 = 112;
            return raw_error == ERROR_DISK_FULL;
        }
    }

    false
}

/// Errors that can occur while mirroring.
///
/// All errors include relevant path information where one exists, so the
/// rendered message is enough for an operator reading the activity log.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// IO error during file operations
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Failed to copy one or more files of a directory
    #[error("failed to copy {failed} of {total} files (first: {first})")]
    PartialCopy {
        /// Number of files that failed to copy
        failed: usize,
        /// Total number of files
        total: usize,
        /// First file that failed
        first: PathBuf,
    },

    /// Destination ran out of space while replicating a directory
    ///
    /// Files copied before the error are kept: they are valid mirror
    /// content and the next event or reconciliation resumes from them.
    #[error("no space left on device at {path}: {files_copied} of {total_files} files copied")]
    NoSpace {
        /// Number of files that were successfully copied before the error
        files_copied: usize,
        /// Number of files that failed to copy
        failed_files: usize,
        /// Total number of files attempted
        total_files: usize,
        /// The path where the no-space error occurred
        path: PathBuf,
    },

    /// Source path does not exist
    #[error("source path does not exist: {0}")]
    SourceNotFound(PathBuf),

    /// Source is not a directory
    #[error("source is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Failed to create temporary file
    #[error("failed to create temporary file in {path}: {source}")]
    TempFile {
        /// Directory where temp file creation was attempted
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Failed to persist temporary file
    #[error("failed to persist temporary file to {path}: {source}")]
    Persist {
        /// Target path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// A required setting is absent or empty
    #[error("missing required setting {0}")]
    MissingSetting(&'static str),

    /// A setting has a value that cannot be parsed
    #[error("invalid value {value:?} for {key} (expected {expected})")]
    InvalidSetting {
        /// Setting key
        key: &'static str,
        /// Raw value found
        value: String,
        /// Human readable description of accepted values
        expected: &'static str,
    },

    /// A path setting is not absolute
    #[error("{key} must be an absolute path, got {path}")]
    NotAbsolute {
        /// Setting key
        key: &'static str,
        /// Offending path
        path: PathBuf,
    },

    /// The activity log could not be created or appended to
    #[error("cannot write activity log {path}: {source}")]
    LogSink {
        /// Log file path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// A filesystem subscription could not be set up
    #[error("cannot watch {path}: {source}")]
    Watch {
        /// Watched root
        path: PathBuf,
        /// Underlying notify error
        source: notify::Error,
    },

    /// A blocking copy task panicked or was aborted
    #[error("background copy task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Whether this error comes from validating settings, as opposed to
    /// anything that happened on the filesystem.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingSetting(_) | Self::InvalidSetting { .. } | Self::NotAbsolute { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_no_space_error_storage_full_kind() {
        let error = io::Error::new(io::ErrorKind::StorageFull, "disk full");
        assert!(is_no_space_error(&error));
    }

    #[test]
    fn test_is_no_space_error_other_kind() {
        let error = io::Error::new(io::ErrorKind::NotFound, "not found");
        assert!(!is_no_space_error(&error));
    }

    #[cfg(unix)]
    #[test]
    fn test_is_no_space_error_enospc() {
        let error = io::Error::from_raw_os_error(28); // ENOSPC
        assert!(is_no_space_error(&error));
    }

    #[test]
    fn test_no_space_error_display() {
        let error = Error::NoSpace {
            files_copied: 5,
            failed_files: 3,
            total_files: 8,
            path: PathBuf::from("/mirror/file.txt"),
        };
        let msg = error.to_string();
        assert!(msg.contains("no space left on device at /mirror/file.txt"));
        assert!(msg.contains("5 of 8 files copied"));
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::MissingSetting("NETWORK_FOLDER").is_configuration());
        assert!(
            Error::NotAbsolute {
                key: "SYNC_LOG",
                path: PathBuf::from("logs/sync.log"),
            }
            .is_configuration()
        );
        assert!(
            !Error::LogSink {
                path: PathBuf::from("/var/log/sync.log"),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            }
            .is_configuration()
        );
        assert!(!Error::SourceNotFound(PathBuf::from("/data/a")).is_configuration());
    }
}
