//! Pipeline Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A pipeline error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Per-record failures never surface here; they are counted in the
/// [`ScanSummary`](crate::ScanSummary) instead.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The scan root is missing or not a directory. Nothing was processed.
    #[display("cannot scan {}", _0.display())]
    Root(#[error(not(source))] PathBuf),
    /// The sink failed to shut down cleanly.
    #[display("failed to close record sink")]
    Sink,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
