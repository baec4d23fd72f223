//! Scan orchestration.
//!
//! [`Orchestrator::run()`] walks a directory tree and hands each discovered
//! [`FileRecord`](rfp_scan::FileRecord) to a [`RecordSink`], one at a time.
//! Failures for individual entries are logged and counted, never fatal; only
//! a bad root stops a run before it starts.

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use futures::StreamExt;
use rfp_publish::{Destination, DryRun, RecordSink};
use rfp_scan::RecordStream;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Log a progress line after this many processed files.
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Outcome of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Records successfully handed to the sink.
    pub files_processed: u64,
    /// Walk, extraction and publish failures; one per affected entry.
    pub errors_encountered: u64,
    /// The scan stopped early because cancellation was requested.
    pub cancelled: bool,
}
impl ScanSummary {
    /// Count one processed file. Returns `true` when the count reaches a
    /// multiple of [`PROGRESS_INTERVAL`].
    pub fn record_processed(&mut self) -> bool {
        self.files_processed += 1;
        self.files_processed % PROGRESS_INTERVAL == 0
    }
}

/// Drives the walker into a sink.
pub struct Orchestrator {
    sink: Box<dyn RecordSink>,
    dry_run: DryRun,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// `sink` receives every record unless a run is a dry run. `cancel` is
    /// checked before each record is pulled from the walk.
    pub fn new(sink: Box<dyn RecordSink>, cancel: CancellationToken) -> Self {
        Self {
            sink,
            dry_run: DryRun::new(),
            cancel,
        }
    }

    /// Walk `root` and publish every file to `destination`.
    ///
    /// With `dry_run` the configured sink is never touched; records are
    /// logged instead. The returned summary covers this run only.
    pub async fn run(&mut self, root: impl AsRef<Path>, destination: &Destination, dry_run: bool) -> Result<ScanSummary> {
        let root = root.as_ref();
        let records = rfp_scan::walk(root).await.or_raise(|| ErrorKind::Root(root.to_path_buf()))?;
        tracing::info!(root = %root.display(), "Starting scan");
        Ok(self.run_stream(records, destination, dry_run).await)
    }

    /// Drain an already opened walk into the sink.
    pub async fn run_stream(&mut self, mut records: RecordStream, destination: &Destination, dry_run: bool) -> ScanSummary {
        let sink: &mut dyn RecordSink = if dry_run { &mut self.dry_run } else { self.sink.as_mut() };
        tracing::info!(queue = %destination.queue, sink = sink.name(), dry_run, "Publishing records");

        let mut summary = ScanSummary::default();
        loop {
            if self.cancel.is_cancelled() {
                tracing::warn!(files_processed = summary.files_processed, "Scan interrupted");
                summary.cancelled = true;
                break;
            }
            let Some(result) = records.next().await else {
                break;
            };
            let record = match result {
                Ok(record) => record,
                Err(err) => {
                    summary.errors_encountered += 1;
                    if err.is_walk_error() {
                        tracing::error!(error = ?err, "Failed to read directory; its contents were skipped");
                    } else {
                        tracing::error!(error = ?err, "Failed to read file metadata");
                    }
                    continue;
                },
            };
            match sink.publish(&record, destination).await {
                Ok(_) => {
                    if summary.record_processed() {
                        tracing::info!(files_processed = summary.files_processed, "Scan in progress");
                    }
                },
                Err(err) => {
                    summary.errors_encountered += 1;
                    tracing::error!(path = %record.path.display(), error = ?err, "Failed to publish record");
                },
            }
        }

        tracing::info!(
            files_processed = summary.files_processed,
            errors_encountered = summary.errors_encountered,
            cancelled = summary.cancelled,
            "Scan complete"
        );
        summary
    }

    /// Close the sink's broker connection, if any.
    pub async fn finish(mut self) -> Result<()> {
        self.sink.close().await.or_raise(|| ErrorKind::Sink)
    }
}
