//! Error types for the ingestion pipeline

use crate::parser::ParseError;
use abr_common::AbrError;
use thiserror::Error;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors raised while loading, indexing or querying the registry store.
///
/// Skipped records and missing optional fields are not errors: the first is
/// counted in [`FileReport`](crate::orchestrator::FileReport), the second
/// becomes an empty string during normalization.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Malformed XML in {file} at byte {position} after {records} records: {source}")]
    MalformedInput {
        file: String,
        position: u64,
        records: u64,
        #[source]
        source: ParseError,
    },

    #[error("Batch write failed for {file} near record {records} (byte {position}): {source}")]
    WriteFailure {
        file: String,
        position: u64,
        records: u64,
        #[source]
        source: sqlx::Error,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid search query: {0:?}")]
    InvalidQuery(String),

    #[error("No *.xml or *.xml.gz input files found under {0}")]
    NoInputFiles(String),

    #[error(transparent)]
    Common(#[from] AbrError),
}

impl IngestError {
    pub fn malformed(file: impl Into<String>, source: ParseError) -> Self {
        Self::MalformedInput {
            file: file.into(),
            position: source.position(),
            records: source.records(),
            source,
        }
    }

    pub fn write_failure(
        file: impl Into<String>,
        position: u64,
        records: u64,
        source: sqlx::Error,
    ) -> Self {
        Self::WriteFailure {
            file: file.into(),
            position,
            records,
            source,
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True for errors that abort only the current file rather than the run
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::MalformedInput { .. } | Self::WriteFailure { .. } | Self::Io { .. }
        )
    }
}
