//! Dry-run sink.
//!
//! Stands in for a [`Publisher`](crate::Publisher) and never opens a broker
//! connection. Every record is encoded exactly as it would be sent, then
//! logged instead of published.

use crate::error::{ErrorKind, Result};
use crate::{Ack, Destination, FileRecord, RecordSink};
use async_trait::async_trait;
use exn::ResultExt;

/// Logs each record's wire message and reports it as [`Ack::Logged`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRun;
impl DryRun {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RecordSink for DryRun {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn publish(&mut self, record: &FileRecord, destination: &Destination) -> Result<Ack> {
        let body = record.to_json().or_raise(|| ErrorKind::Serialization(record.path.clone()))?;
        let message = String::from_utf8_lossy(&body);
        tracing::info!(queue = %destination.queue, %message, "[DRY-RUN] Would publish");
        Ok(Ack::Logged)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[tokio::test]
    async fn test_logs_instead_of_publishing() {
        let record = FileRecord::new("/data/a.txt", 10, datetime!(2024-01-01 00:00:00 UTC)).unwrap();
        let mut sink = DryRun::new();
        let ack = sink.publish(&record, &Destination::queue("q")).await.unwrap();
        assert_eq!(ack, Ack::Logged);
        sink.close().await.unwrap();
        sink.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unencodable_record_fails() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        let path = std::path::PathBuf::from(OsStr::from_bytes(b"/data/\xfe"));
        let record = FileRecord::new(path, 1, datetime!(2024-01-01 00:00:00 UTC)).unwrap();
        let err = DryRun.publish(&record, &Destination::queue("q")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Serialization(_)));
    }
}
