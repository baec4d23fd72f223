//! Publish Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;
use std::time::Duration;

/// A publish error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for publish operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
///
/// ### Transient (retried by the [`Publisher`](crate::Publisher))
/// - [`ErrorKind::Connection`]
/// - [`ErrorKind::Timeout`]
/// - [`ErrorKind::Rejected`]
///
/// ### Terminal (reported once per record)
/// - [`ErrorKind::Serialization`]
/// - [`ErrorKind::RetriesExhausted`]
/// - [`ErrorKind::Close`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Broker unreachable, or the connection/channel failed mid-operation.
    #[display("broker connection error")]
    Connection,
    /// A connection attempt did not complete in time.
    #[display("broker connection attempt timed out after {}ms", _0.as_millis())]
    Timeout(#[error(not(source))] Duration),
    /// Broker negatively acknowledged the message.
    #[display("broker rejected message")]
    Rejected,
    /// Record could not be encoded as a wire message. Don't retry.
    #[display("failed to serialize record: {}", _0.display())]
    Serialization(#[error(not(source))] PathBuf),
    /// Every attempt allowed by the retry policy failed.
    #[display("giving up after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made for the record.
        attempts: u32,
    },
    /// Shutting down the broker connection failed.
    #[display("failed to close broker connection")]
    Close,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection | Self::Timeout(_) | Self::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Connection, true)]
    #[case(ErrorKind::Timeout(Duration::from_secs(1)), true)]
    #[case(ErrorKind::Rejected, true)]
    #[case(ErrorKind::Serialization(PathBuf::from("/a")), false)]
    #[case(ErrorKind::RetriesExhausted { attempts: 3 }, false)]
    #[case(ErrorKind::Close, false)]
    fn test_retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorKind::RetriesExhausted { attempts: 4 }.to_string(), "giving up after 4 attempts");
        assert_eq!(
            ErrorKind::Timeout(Duration::from_millis(1500)).to_string(),
            "broker connection attempt timed out after 1500ms"
        );
    }
}
