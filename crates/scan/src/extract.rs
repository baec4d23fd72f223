//! Single-file metadata extraction.

use crate::error::{ErrorKind, Result};
use crate::record::{FileRecord, utc_from_system_time};
use exn::ResultExt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Extract a [`FileRecord`] for the regular file at `path`.
///
/// Relative paths are made absolute against the current working directory
/// (symlinks are not resolved). Exactly one `stat` is performed.
///
/// # Errors
///
/// - [`NotFound`](ErrorKind::NotFound) if the file vanished,
/// - [`PermissionDenied`](ErrorKind::PermissionDenied) if it cannot be stat'ed,
/// - [`NotAFile`](ErrorKind::NotAFile) if it is a directory or special file,
/// - [`InvalidTimestamp`](ErrorKind::InvalidTimestamp) if its modification
///   time is outside the representable range.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> rfp_scan::error::Result<()> {
/// let record = rfp_scan::extract("/var/log/syslog").await?;
/// println!("{} is {} bytes", record.name, record.size_bytes);
/// # Ok(())
/// # }
/// ```
pub async fn extract(path: impl AsRef<Path>) -> Result<FileRecord> {
    let path = path.as_ref();
    let path = std::path::absolute(path).map_err(|e| ErrorKind::from_io(e, path))?;
    let metadata = fs::metadata(&path).await.map_err(|e| ErrorKind::from_io(e, &path))?;
    record_from_metadata(path, &metadata)
}

/// Shared by [`extract`] and the walker, which already holds the metadata
/// from classifying the directory entry.
pub(crate) fn record_from_metadata(path: PathBuf, metadata: &Metadata) -> Result<FileRecord> {
    if !metadata.is_file() {
        exn::bail!(ErrorKind::NotAFile(path));
    }
    let modified = metadata.modified().map_err(|e| ErrorKind::from_io(e, &path))?;
    let Some(modified) = utc_from_system_time(modified) else {
        exn::bail!(ErrorKind::InvalidTimestamp(path));
    };
    FileRecord::new(&path, metadata.len(), modified).or_raise(|| ErrorKind::InvalidTimestamp(path.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_extract_name_and_size() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("notes.txt");
        std::fs::write(&path, b"0123456789").unwrap();
        let record = extract(&path).await.unwrap();
        assert_eq!(record.name, "notes.txt");
        assert_eq!(record.size_bytes, 10);
        assert_eq!(record.path, path);
        assert!(record.path.is_absolute());
    }

    #[tokio::test]
    async fn test_extract_empty_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();
        let record = extract(&path).await.unwrap();
        assert_eq!(record.size_bytes, 0);
        assert_eq!(record.name, "empty");
    }

    #[tokio::test]
    async fn test_extract_modified_time_matches_filesystem() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stamp");
        std::fs::write(&path, b"x").unwrap();
        let expected: time::OffsetDateTime = std::fs::metadata(&path).unwrap().modified().unwrap().into();
        let record = extract(&path).await.unwrap();
        let drift = expected - record.modified_ts;
        assert!(drift >= time::Duration::ZERO && drift < time::Duration::microseconds(1));
    }

    #[tokio::test]
    async fn test_extract_relative_path_is_made_absolute() {
        // Cargo runs unit tests from the package root.
        let record = extract("Cargo.toml").await.unwrap();
        assert!(record.path.is_absolute());
        assert!(record.path.ends_with("Cargo.toml"));
        assert_eq!(record.name, "Cargo.toml");
    }

    #[tokio::test]
    async fn test_extract_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = extract(temp_dir.path().join("missing.txt")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_extract_directory_is_not_a_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = extract(temp_dir.path()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotAFile(_)));
    }
}
