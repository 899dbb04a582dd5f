//! Per-file run log in the `ingest_files` table

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Running,
    Completed,
    Failed,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Running => "running",
            FileStatus::Completed => "completed",
            FileStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters written when a file finishes
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCounters {
    pub records_seen: u64,
    pub records_skipped: u64,
    pub rows_inserted: u64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct IngestFileEntry {
    pub id: i64,
    pub file_name: String,
    pub file_size: i64,
    pub status: String,
    pub records_seen: i64,
    pub records_skipped: i64,
    pub rows_inserted: i64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Open a `running` entry and return its id
pub async fn start_file(pool: &SqlitePool, file_name: &str, file_size: u64) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO ingest_files (file_name, file_size, status, started_at)
        VALUES (?1, ?2, ?3, ?4)
        RETURNING id
        "#,
    )
    .bind(file_name)
    .bind(i64::try_from(file_size).unwrap_or(i64::MAX))
    .bind(FileStatus::Running.as_str())
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(id)
}

pub async fn complete_file(pool: &SqlitePool, id: i64, counters: FileCounters) -> Result<()> {
    finish_file(pool, id, FileStatus::Completed, counters, None).await
}

pub async fn fail_file(
    pool: &SqlitePool,
    id: i64,
    counters: FileCounters,
    error: &str,
) -> Result<()> {
    finish_file(pool, id, FileStatus::Failed, counters, Some(error)).await
}

async fn finish_file(
    pool: &SqlitePool,
    id: i64,
    status: FileStatus,
    counters: FileCounters,
    error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE ingest_files
        SET status = ?1,
            records_seen = ?2,
            records_skipped = ?3,
            rows_inserted = ?4,
            error = ?5,
            completed_at = ?6
        WHERE id = ?7
        "#,
    )
    .bind(status.as_str())
    .bind(to_i64(counters.records_seen))
    .bind(to_i64(counters.records_skipped))
    .bind(to_i64(counters.rows_inserted))
    .bind(error)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recent entries first
pub async fn recent_files(pool: &SqlitePool, limit: u32) -> Result<Vec<IngestFileEntry>> {
    let entries = sqlx::query_as::<_, IngestFileEntry>(
        r#"
        SELECT id, file_name, file_size, status, records_seen, records_skipped,
               rows_inserted, error, started_at, completed_at
        FROM ingest_files
        ORDER BY id DESC
        LIMIT ?1
        "#,
    )
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
