//! ABR Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Streaming loader for Australian Business Register bulk extracts. Each
//! `<ABR>` record is parsed, normalized into relational rows and committed
//! to SQLite in atomic batches, with FTS5 name mirrors kept in sync by
//! triggers.
//!
//! # Pipeline
//!
//! - [`parser`]: forward-only record stream over plain or gzipped XML
//! - [`normalizer`]: one record to rows for every target table
//! - [`storage`]: batched `INSERT OR IGNORE` writer
//! - [`orchestrator`]: file discovery, per-file runs, progress callbacks
//! - [`schema`]: tables, indexes, search mirrors and their triggers
//! - [`search`]: name search and record details
//!
//! # Example
//!
//! ```no_run
//! use abr_ingest::{db, IngestConfig, IngestionOrchestrator};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let pool = db::create_pool(&db::DbConfig::from(&config)).await?;
//!
//!     let summary = IngestionOrchestrator::new(pool, config)
//!         .run(&[PathBuf::from("./data")])
//!         .await?;
//!     println!("{} records loaded", summary.records_seen());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod observer;
pub mod orchestrator;
pub mod parser;
pub mod progress;
pub mod runlog;
pub mod schema;
pub mod search;
pub mod storage;

pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use models::{NormalizedRecord, Table};
pub use normalizer::normalize;
pub use observer::{BatchProgress, IngestObserver, NoopObserver, TracingObserver};
pub use orchestrator::{FileReport, IngestSummary, IngestionOrchestrator};
pub use parser::{RecordStream, XmlNode};
pub use schema::SchemaManager;
pub use storage::{BatchWriter, FlushStats};
