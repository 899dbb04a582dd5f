//! Console progress for the `ingest` command
//!
//! One spinner per file, updated on every committed batch.

use crate::error::IngestError;
use crate::observer::{BatchProgress, IngestObserver};
use crate::orchestrator::FileReport;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {prefix:.bold} {msg}";

/// Renders ingestion progress with `indicatif`
#[derive(Default)]
pub struct ProgressObserver {
    current: Mutex<Option<ProgressBar>>,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn spinner(prefix: String, message: String) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template(SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_prefix(prefix);
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    fn with_current(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.current.lock() {
            if let Some(pb) = guard.as_ref() {
                f(pb);
            }
        }
    }

    fn take_current(&self) -> Option<ProgressBar> {
        self.current.lock().ok().and_then(|mut guard| guard.take())
    }
}

impl IngestObserver for ProgressObserver {
    fn on_file_start(&self, file: &Path, index: usize, total: usize, size_bytes: u64) {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        let pb = Self::spinner(
            format!("[{}/{}] {}", index + 1, total, name),
            format!("{} - starting", format_bytes(size_bytes)),
        );

        if let Ok(mut guard) = self.current.lock() {
            if let Some(previous) = guard.replace(pb) {
                previous.finish_and_clear();
            }
        }
    }

    fn on_batch_committed(&self, progress: &BatchProgress<'_>) {
        let rate = records_per_sec(progress.run_records, progress.elapsed);
        self.with_current(|pb| {
            pb.set_message(format!(
                "{} records, batch {} committed ({} rows), {:.0} rec/s",
                progress.file_records,
                progress.batch,
                progress.stats.total_rows(),
                rate
            ));
        });
    }

    fn on_file_complete(&self, report: &FileReport) {
        if let Some(pb) = self.take_current() {
            pb.finish_with_message(format!(
                "done: {} records ({} skipped), {} rows in {:.1}s",
                report.records_seen,
                report.records_skipped,
                report.total_rows(),
                report.elapsed.as_secs_f64()
            ));
        }
    }

    fn on_file_failed(&self, _file: &Path, error: &IngestError) {
        if let Some(pb) = self.take_current() {
            pb.abandon_with_message(format!("failed: {error}"));
        }
    }
}

fn records_per_sec(records: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        records as f64 / secs
    } else {
        0.0
    }
}

/// Human-readable byte size
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
