// Ingestion Orchestrator
//
// Drives one parser -> normalizer -> writer pipeline per input file, strictly
// sequentially. Files are processed in lexicographic path order so repeated
// runs over the same directory behave identically.

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::models::Table;
use crate::normalizer::normalize;
use crate::observer::{BatchProgress, IngestObserver, TracingObserver};
use crate::parser::RecordStream;
use crate::runlog::{self, FileCounters};
use crate::schema::SchemaManager;
use crate::storage::{BatchWriter, FlushStats};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use walkdir::WalkDir;

// ============================================================================
// Reports
// ============================================================================

/// Outcome of one fully ingested file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: PathBuf,
    pub records_seen: u64,
    /// Records dropped for lacking an ABN
    pub records_skipped: u64,
    pub batches: usize,
    pub rows_inserted: BTreeMap<Table, u64>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl FileReport {
    fn new(file: &Path) -> Self {
        Self {
            file: file.to_path_buf(),
            records_seen: 0,
            records_skipped: 0,
            batches: 0,
            rows_inserted: BTreeMap::new(),
            elapsed: Duration::ZERO,
        }
    }

    fn absorb(&mut self, stats: &FlushStats) {
        self.batches += 1;
        for (table, rows) in &stats.rows_inserted {
            *self.rows_inserted.entry(*table).or_default() += rows;
        }
    }

    pub fn total_rows(&self) -> u64 {
        self.rows_inserted.values().sum()
    }

    pub fn rows_for(&self, table: Table) -> u64 {
        self.rows_inserted.get(&table).copied().unwrap_or(0)
    }

    fn counters(&self) -> FileCounters {
        FileCounters {
            records_seen: self.records_seen,
            records_skipped: self.records_skipped,
            rows_inserted: self.total_rows(),
        }
    }
}

/// A file that failed while `continue_on_error` was set
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub file: PathBuf,
    pub error: String,
}

/// Totals for one run over any number of files
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub files: Vec<FileReport>,
    pub failures: Vec<FileFailure>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl IngestSummary {
    pub fn records_seen(&self) -> u64 {
        self.files.iter().map(|f| f.records_seen).sum()
    }

    pub fn records_skipped(&self) -> u64 {
        self.files.iter().map(|f| f.records_skipped).sum()
    }

    pub fn rows_inserted(&self) -> u64 {
        self.files.iter().map(FileReport::total_rows).sum()
    }

    pub fn rows_for(&self, table: Table) -> u64 {
        self.files.iter().map(|f| f.rows_for(table)).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct RunProgress {
    started: Instant,
    records_committed: u64,
}

// ============================================================================
// File Discovery
// ============================================================================

/// Whether a file name looks like a bulk extract (`*.xml` or `*.xml.gz`)
pub fn is_input_file(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.ends_with(".xml") || name.ends_with(".xml.gz")
}

/// Expand directories (non-recursively) and sort the result
pub fn discover_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|e| IngestError::io(path.display().to_string(), e.into()))?;
                if entry.file_type().is_file() && is_input_file(&entry.file_name().to_string_lossy())
                {
                    files.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(IngestError::io(
                path.display().to_string(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or directory"),
            ));
        }
    }

    files.sort();
    files.dedup();

    if files.is_empty() {
        let searched = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(IngestError::NoInputFiles(searched));
    }

    Ok(files)
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct IngestionOrchestrator {
    pool: SqlitePool,
    config: IngestConfig,
    observer: Arc<dyn IngestObserver>,
}

impl IngestionOrchestrator {
    pub fn new(pool: SqlitePool, config: IngestConfig) -> Self {
        Self {
            pool,
            config,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn IngestObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Ingest every input under `paths`, in lexicographic order
    ///
    /// Ensures the schema first. A per-file failure stops the run unless
    /// `continue_on_error` is set; batches committed before it stay.
    pub async fn run(&self, paths: &[PathBuf]) -> Result<IngestSummary> {
        let files = discover_files(paths)?;
        SchemaManager::new(self.pool.clone()).ensure_all().await?;

        info!(
            files = files.len(),
            batch_size = self.config.batch_size,
            continue_on_error = self.config.continue_on_error,
            "Starting ingestion"
        );

        let mut progress = RunProgress {
            started: Instant::now(),
            records_committed: 0,
        };
        let mut summary = IngestSummary::default();

        for (index, path) in files.iter().enumerate() {
            match self.ingest_one(path, index, files.len(), &mut progress).await {
                Ok(report) => summary.files.push(report),
                Err(err) if self.config.continue_on_error && err.is_per_file() => {
                    error!(file = %path.display(), error = %err, "Skipping failed file");
                    summary.failures.push(FileFailure {
                        file: path.clone(),
                        error: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        summary.elapsed = progress.started.elapsed();

        info!(
            files = summary.files.len(),
            failed = summary.failures.len(),
            records = summary.records_seen(),
            skipped = summary.records_skipped(),
            rows = summary.rows_inserted(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Ingestion finished"
        );

        Ok(summary)
    }

    /// Ingest a single file; the schema must already exist
    pub async fn ingest_file(&self, path: &Path) -> Result<FileReport> {
        let mut progress = RunProgress {
            started: Instant::now(),
            records_committed: 0,
        };
        self.ingest_one(path, 0, 1, &mut progress).await
    }

    async fn ingest_one(
        &self,
        path: &Path,
        index: usize,
        total: usize,
        progress: &mut RunProgress,
    ) -> Result<FileReport> {
        let label = path.display().to_string();
        let size = std::fs::metadata(path)
            .map_err(|e| IngestError::io(label.as_str(), e))?
            .len();

        self.observer.on_file_start(path, index, total, size);
        let entry = runlog::start_file(&self.pool, &label, size).await?;

        let started = Instant::now();
        let mut report = FileReport::new(path);
        let outcome = self.stream_file(path, &label, &mut report, progress).await;
        report.elapsed = started.elapsed();

        match outcome {
            Ok(()) => {
                runlog::complete_file(&self.pool, entry, report.counters()).await?;
                self.observer.on_file_complete(&report);
                Ok(report)
            }
            Err(err) => {
                if let Err(log_err) =
                    runlog::fail_file(&self.pool, entry, report.counters(), &err.to_string()).await
                {
                    error!(file = %label, error = %log_err, "Could not record file failure");
                }
                self.observer.on_file_failed(path, &err);
                Err(err)
            }
        }
    }

    async fn stream_file(
        &self,
        path: &Path,
        label: &str,
        report: &mut FileReport,
        progress: &mut RunProgress,
    ) -> Result<()> {
        let mut records = RecordStream::open(path)?;
        let mut writer = BatchWriter::with_batch_size(self.pool.clone(), self.config.batch_size);

        while let Some(item) = records.next() {
            let node = item.map_err(|e| IngestError::malformed(label, e))?;
            report.records_seen += 1;

            let Some(record) = normalize(&node) else {
                report.records_skipped += 1;
                continue;
            };

            let committed = writer.add(record).await.map_err(|e| {
                IngestError::write_failure(label, records.byte_position(), report.records_seen, e)
            })?;

            if let Some(stats) = committed {
                self.batch_committed(path, &stats, report, progress);
            }
        }

        let trailing = writer.finish().await.map_err(|e| {
            IngestError::write_failure(label, records.byte_position(), report.records_seen, e)
        })?;

        if trailing.records > 0 {
            self.batch_committed(path, &trailing, report, progress);
        }

        Ok(())
    }

    fn batch_committed(
        &self,
        path: &Path,
        stats: &FlushStats,
        report: &mut FileReport,
        progress: &mut RunProgress,
    ) {
        report.absorb(stats);
        progress.records_committed += stats.records as u64;

        self.observer.on_batch_committed(&BatchProgress {
            file: path,
            batch: report.batches,
            stats,
            file_records: report.records_seen,
            run_records: progress.records_committed,
            elapsed: progress.started.elapsed(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_input_file() {
        assert!(is_input_file("20240101_Public01.xml"));
        assert!(is_input_file("20240101_Public01.XML"));
        assert!(is_input_file("20240101_Public01.xml.gz"));
        assert!(!is_input_file("README.md"));
        assert!(!is_input_file("archive.zip"));
        assert!(!is_input_file("notes.gz"));
    }

    #[test]
    fn test_discover_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_Public02.xml", "a_Public01.xml.gz", "c_Public03.xml", "readme.txt"] {
            fs::write(dir.path().join(name), "<Transfer/>").unwrap();
        }
        fs::create_dir(dir.path().join("nested.xml")).unwrap();

        let files = discover_files(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a_Public01.xml.gz", "b_Public02.xml", "c_Public03.xml"]);
    }

    #[test]
    fn test_discover_explicit_files_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("one.xml");
        fs::write(&file, "<Transfer/>").unwrap();

        let files = discover_files(&[file.clone(), dir.path().to_path_buf()]).unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn test_discover_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_files(&[dir.path().to_path_buf()]),
            Err(IngestError::NoInputFiles(_))
        ));
        assert!(matches!(
            discover_files(&[dir.path().join("missing.xml")]),
            Err(IngestError::Io { .. })
        ));
    }
}
