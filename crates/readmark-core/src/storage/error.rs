//! Storage error handling
//!
//! Provides typed errors for progress file operations with descriptive
//! messages and recovery suggestions.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use super::persistence::RestoreSource;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create data directory
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Disk is full or quota exceeded
    #[error(
        "Disk full or quota exceeded while writing to '{path}'. Free up disk space and try again."
    )]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read file
    #[error("Failed to read '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write file
    #[error("Failed to write '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Progress file exists but cannot be parsed
    #[error("Progress file '{path}' is corrupted: {details}")]
    Corrupt { path: PathBuf, details: String },

    /// Database could not be serialized
    #[error("Failed to serialize progress database: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Atomic write failed during rename
    #[error("Atomic write failed: could not rename '{from}' to '{to}': {source}")]
    AtomicWriteFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The writer task has stopped and no longer accepts requests
    #[error("Progress writer is closed")]
    WriterClosed,

    /// A save or delete failed and the primary file was replaced by recovery
    ///
    /// Anything written since the backup was taken is no longer on disk.
    #[error("{source} (progress file reset from {restored})")]
    RolledBack {
        #[source]
        source: Box<StorageError>,
        restored: RestoreSource,
    },
}

impl StorageError {
    /// Create an error from an I/O error with path context
    ///
    /// Classifies the error based on its kind (permission, disk full, etc.)
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                path,
                source: error,
            },
            _ if is_disk_full_error(&error) => StorageError::DiskFull {
                path,
                source: error,
            },
            _ => StorageError::WriteError {
                path,
                source: error,
            },
        }
    }

    /// Create a read error, keeping permission problems distinct
    pub fn from_read(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                path,
                source: error,
            },
            _ => StorageError::ReadError {
                path,
                source: error,
            },
        }
    }

    /// Whether the primary file was replaced after this failure
    pub fn rolled_back(&self) -> bool {
        matches!(self, StorageError::RolledBack { .. })
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::DiskFull { .. } => Some("Free up disk space and try again."),
            StorageError::PermissionDenied { .. } => {
                Some("Check file and directory permissions for the readmark data directory.")
            }
            StorageError::Corrupt { .. } => {
                Some("Run `readmark restore` to recover the last backup, or remove the file to start fresh.")
            }
            StorageError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            StorageError::RolledBack { source, .. } => source.recovery_suggestion(),
            _ => None,
        }
    }
}

/// Check if an I/O error indicates disk full condition
fn is_disk_full_error(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("disk full")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_classification() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = StorageError::from_io(io_err, PathBuf::from("/test/path"));

        assert!(matches!(err, StorageError::PermissionDenied { .. }));
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_read_classification() {
        let io_err = io::Error::new(io::ErrorKind::InvalidData, "bad bytes");
        let err = StorageError::from_read(io_err, PathBuf::from("/data/progress.json"));

        assert!(matches!(err, StorageError::ReadError { .. }));
        assert!(err.recovery_suggestion().is_none());
    }

    #[test]
    fn test_disk_full_detection() {
        let io_err = io::Error::new(io::ErrorKind::Other, "No space left on device");
        let err = StorageError::from_io(io_err, PathBuf::from("/full/disk"));

        assert!(matches!(err, StorageError::DiskFull { .. }));
        assert!(!err.rolled_back());
    }

    #[test]
    fn test_rolled_back_keeps_cause() {
        let io_err = io::Error::new(io::ErrorKind::Other, "No space left on device");
        let err = StorageError::RolledBack {
            source: Box::new(StorageError::from_io(io_err, PathBuf::from("/data/progress.json"))),
            restored: RestoreSource::Backup,
        };

        assert!(err.rolled_back());
        assert!(err.to_string().contains("Disk full"));
        assert!(err.to_string().ends_with("(progress file reset from the backup)"));
        assert_eq!(err.recovery_suggestion(), Some("Free up disk space and try again."));
    }

    #[test]
    fn test_corrupt_display() {
        let err = StorageError::Corrupt {
            path: PathBuf::from("/data/progress.json"),
            details: "expected value at line 1 column 1".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("corrupted"));
        assert!(msg.contains("/data/progress.json"));
        assert!(err.recovery_suggestion().unwrap().contains("restore"));
    }

    #[test]
    fn test_writer_closed_display() {
        assert_eq!(
            StorageError::WriterClosed.to_string(),
            "Progress writer is closed"
        );
    }
}
