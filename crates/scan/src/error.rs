//! Scan Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};

/// A scan error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// ### Fatal (raised before a walk yields anything)
/// - [`ErrorKind::RootNotFound`]
/// - [`ErrorKind::RootNotADirectory`]
///
/// ### Walk errors (one per directory, the walk continues)
/// - [`ErrorKind::UnreadableDirectory`]
///
/// ### Extraction errors (one per file, the walk continues)
/// - [`ErrorKind::NotFound`]
/// - [`ErrorKind::PermissionDenied`]
/// - [`ErrorKind::NotAFile`]
/// - [`ErrorKind::InvalidTimestamp`]
/// - [`ErrorKind::Io`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Scan root does not exist
    #[display("root not found: {}", _0.display())]
    RootNotFound(#[error(not(source))] PathBuf),
    /// Scan root exists but is not a directory
    #[display("root is not a directory: {}", _0.display())]
    RootNotADirectory(#[error(not(source))] PathBuf),
    /// A directory below the root could not be opened or listed
    #[display("unreadable directory: {}", _0.display())]
    UnreadableDirectory(#[error(not(source))] PathBuf),
    /// File vanished between discovery and extraction
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied while reading metadata
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Path exists but does not reference a regular file
    #[display("not a regular file: {}", _0.display())]
    NotAFile(#[error(not(source))] PathBuf),
    /// Modification time could not be represented
    #[display("invalid modification time: {}", _0.display())]
    InvalidTimestamp(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl ErrorKind {
    pub(crate) fn from_io(err: IoError, path: &Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// Returns `true` if the scan cannot proceed at all.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RootNotFound(_) | Self::RootNotADirectory(_))
    }

    /// Returns `true` if the error concerns a whole directory rather than a
    /// single file.
    pub fn is_walk_error(&self) -> bool {
        matches!(self, Self::UnreadableDirectory(_))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let path = Path::new("/tmp/gone.txt");
        let err = IoError::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(ErrorKind::from_io(err, path), ErrorKind::NotFound(p) if p == path));
        let err = IoError::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(ErrorKind::from_io(err, path), ErrorKind::PermissionDenied(_)));
        let err = IoError::other("disk on fire");
        assert!(matches!(ErrorKind::from_io(err, path), ErrorKind::Io(_)));
    }

    #[test]
    fn test_classification() {
        assert!(ErrorKind::RootNotFound(PathBuf::from("/nope")).is_fatal());
        assert!(ErrorKind::RootNotADirectory(PathBuf::from("/etc/hosts")).is_fatal());
        assert!(!ErrorKind::UnreadableDirectory(PathBuf::from("/root")).is_fatal());
        assert!(ErrorKind::UnreadableDirectory(PathBuf::from("/root")).is_walk_error());
        assert!(!ErrorKind::NotAFile(PathBuf::from("/dev/null")).is_walk_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorKind::NotAFile(PathBuf::from("/dev/null")).to_string(), "not a regular file: /dev/null");
        assert_eq!(ErrorKind::RootNotFound(PathBuf::from("/missing")).to_string(), "root not found: /missing");
    }
}
