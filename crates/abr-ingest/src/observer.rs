//! Progress callbacks for the ingestion pipeline

use crate::error::IngestError;
use crate::orchestrator::FileReport;
use crate::storage::FlushStats;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

/// One committed batch, as seen from the orchestrator
#[derive(Debug, Clone, Copy)]
pub struct BatchProgress<'a> {
    pub file: &'a Path,
    /// 1-based batch number within the file
    pub batch: usize,
    pub stats: &'a FlushStats,
    /// Records read from the current file so far
    pub file_records: u64,
    /// Records committed across the whole run
    pub run_records: u64,
    /// Time since the run started
    pub elapsed: Duration,
}

/// Receives pipeline progress; every method defaults to a no-op
pub trait IngestObserver: Send + Sync {
    fn on_file_start(&self, _file: &Path, _index: usize, _total: usize, _size_bytes: u64) {}

    fn on_batch_committed(&self, _progress: &BatchProgress<'_>) {}

    fn on_file_complete(&self, _report: &FileReport) {}

    fn on_file_failed(&self, _file: &Path, _error: &IngestError) {}
}

/// Ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl IngestObserver for NoopObserver {}

/// Emits structured `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl IngestObserver for TracingObserver {
    fn on_file_start(&self, file: &Path, index: usize, total: usize, size_bytes: u64) {
        info!(
            file = %file.display(),
            position = index + 1,
            total,
            size_bytes,
            "Starting file"
        );
    }

    fn on_batch_committed(&self, progress: &BatchProgress<'_>) {
        info!(
            file = %progress.file.display(),
            batch = progress.batch,
            records = progress.stats.records,
            rows = progress.stats.total_rows(),
            run_records = progress.run_records,
            elapsed_ms = progress.elapsed.as_millis() as u64,
            "Batch committed"
        );
    }

    fn on_file_complete(&self, report: &FileReport) {
        info!(
            file = %report.file.display(),
            records = report.records_seen,
            skipped = report.records_skipped,
            rows = report.total_rows(),
            batches = report.batches,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "File complete"
        );
    }

    fn on_file_failed(&self, file: &Path, err: &IngestError) {
        error!(file = %file.display(), error = %err, "File failed");
    }
}
