//! Recursive directory walking.

use crate::error::{ErrorKind, Result};
use crate::extract::record_from_metadata;
use crate::record::FileRecord;
use async_stream::stream;
use exn::ResultExt;
use futures::Stream;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;

/// Lazy, single-use sequence of walk results.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<FileRecord>> + Send + 'static>>;

enum Pending {
    /// Directory whose children still need listing.
    List(PathBuf),
    /// Directory entry that has not been classified yet.
    Visit(PathBuf),
}

enum WalkEntry {
    File(FileRecord),
    Descend(PathBuf),
    Skip,
}

/// Walk `root` recursively, yielding a [`FileRecord`] for every regular file.
///
/// The root is validated (and canonicalized) before the stream is returned,
/// so a bad root fails fast with [`RootNotFound`](ErrorKind::RootNotFound) or
/// [`RootNotADirectory`](ErrorKind::RootNotADirectory) and nothing is
/// yielded.
///
/// The traversal is depth-first pre-order, and each directory's entries are
/// visited in lexicographic order, so two walks of an unchanged tree yield
/// the same sequence. Failures are yielded in-line and never end the walk:
///
/// - a directory that cannot be listed yields exactly one
///   [`UnreadableDirectory`](ErrorKind::UnreadableDirectory),
/// - a file that cannot be stat'ed yields one extraction error.
///
/// Symlinks to regular files are reported under the link's own path.
/// Broken links, links to directories and special files are skipped.
///
/// # Examples
///
/// ```no_run
/// use futures::StreamExt;
///
/// # async fn example() -> rfp_scan::error::Result<()> {
/// let mut records = rfp_scan::walk("/srv/data").await?;
/// while let Some(result) = records.next().await {
///     match result {
///         Ok(record) => println!("{}: {} bytes", record.path.display(), record.size_bytes),
///         Err(err) => eprintln!("skipped: {err:?}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn walk(root: impl AsRef<Path>) -> Result<RecordStream> {
    let root = root.as_ref();
    let metadata = match fs::metadata(root).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            exn::bail!(ErrorKind::RootNotFound(root.to_path_buf()))
        },
        Err(err) => return Err(err).or_raise(|| ErrorKind::RootNotFound(root.to_path_buf())),
    };
    if !metadata.is_dir() {
        exn::bail!(ErrorKind::RootNotADirectory(root.to_path_buf()));
    }
    let root = fs::canonicalize(root).await.or_raise(|| ErrorKind::RootNotFound(root.to_path_buf()))?;
    tracing::debug!(root = %root.display(), "Starting recursive walk");
    Ok(Box::pin(walk_from(root)))
}

fn walk_from(root: PathBuf) -> impl Stream<Item = Result<FileRecord>> + Send + 'static {
    // Popped from the back: children are pushed in reverse so the smallest
    // name is visited first, and a directory's subtree is finished before its
    // next sibling.
    let mut stack = vec![Pending::List(root)];
    stream! {
        while let Some(pending) = stack.pop() {
            match pending {
                Pending::List(dir) => match read_sorted(&dir).await {
                    Ok(children) => stack.extend(children.into_iter().rev().map(Pending::Visit)),
                    Err(e) => {
                        tracing::warn!(path = %dir.display(), "Cannot read directory; skipping its contents");
                        yield Err(e);
                    },
                },
                Pending::Visit(path) => match classify(path).await {
                    Ok(WalkEntry::File(record)) => yield Ok(record),
                    Ok(WalkEntry::Descend(dir)) => stack.push(Pending::List(dir)),
                    Ok(WalkEntry::Skip) => {},
                    Err(e) => yield Err(e),
                },
            }
        }
    }
}

async fn read_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let unreadable = || ErrorKind::UnreadableDirectory(dir.to_path_buf());
    let mut entries = fs::read_dir(dir).await.or_raise(unreadable)?;
    let mut children = Vec::new();
    while let Some(entry) = entries.next_entry().await.or_raise(unreadable)? {
        children.push(entry.path());
    }
    // All children share a parent, so this orders by file name.
    children.sort();
    Ok(children)
}

async fn classify(path: PathBuf) -> Result<WalkEntry> {
    let metadata = fs::symlink_metadata(&path).await.map_err(|e| ErrorKind::from_io(e, &path))?;
    if metadata.is_dir() {
        return Ok(WalkEntry::Descend(path));
    }
    if metadata.is_file() {
        return record_from_metadata(path, &metadata).map(WalkEntry::File);
    }
    if metadata.is_symlink() {
        return match fs::metadata(&path).await {
            Ok(target) if target.is_file() => record_from_metadata(path, &target).map(WalkEntry::File),
            Ok(_) => {
                tracing::debug!(path = %path.display(), "Skipping symlink to non-file");
                Ok(WalkEntry::Skip)
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Skipping broken symlink");
                Ok(WalkEntry::Skip)
            },
        };
    }
    tracing::debug!(path = %path.display(), "Skipping special file");
    Ok(WalkEntry::Skip)
}
