//! Store schema and full-text search synchronization
//!
//! [`SchemaManager::ensure_schema`] creates the base tables and their lookup
//! indexes. [`SchemaManager::ensure_search_sync`] adds the FTS5 mirrors of
//! `principal_names` and `alternate_names` plus the insert/delete/update
//! triggers that keep them consistent with their base tables. Mirrors are
//! external-content tables keyed by the base table's `rowid`, so they hold
//! only the index and never a second copy of the names.
//!
//! Both operations are idempotent and must run before any ingestion.

use crate::error::Result;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Base tables, keyed tables first
const TABLES: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS abr_records (
        abn TEXT PRIMARY KEY,
        record_last_updated_date TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS identity_status (
        abn TEXT PRIMARY KEY REFERENCES abr_records(abn),
        status TEXT,
        status_date TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS entity_type (
        abn TEXT PRIMARY KEY REFERENCES abr_records(abn),
        entity_type_ind TEXT,
        entity_type_text TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS principal_names (
        abn TEXT NOT NULL REFERENCES abr_records(abn),
        name_type TEXT,
        name TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS individual_names (
        abn TEXT NOT NULL REFERENCES abr_records(abn),
        name_type TEXT,
        name_title TEXT,
        given_name TEXT,
        family_name TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS addresses (
        abn TEXT NOT NULL REFERENCES abr_records(abn),
        state TEXT,
        postcode TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS registration_numbers (
        abn TEXT NOT NULL REFERENCES abr_records(abn),
        number TEXT,
        number_type TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS tax_status (
        abn TEXT NOT NULL REFERENCES abr_records(abn),
        status TEXT,
        status_date TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS fund_entries (
        abn TEXT NOT NULL REFERENCES abr_records(abn),
        status_date TEXT,
        name_type TEXT,
        name TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS alternate_names (
        abn TEXT NOT NULL REFERENCES abr_records(abn),
        name_type TEXT,
        name TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS ingest_files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_name TEXT NOT NULL,
        file_size INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL,
        records_seen INTEGER NOT NULL DEFAULT 0,
        records_skipped INTEGER NOT NULL DEFAULT 0,
        rows_inserted INTEGER NOT NULL DEFAULT 0,
        error TEXT,
        started_at TEXT NOT NULL,
        completed_at TEXT
    )"#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_principal_names_abn ON principal_names(abn)",
    "CREATE INDEX IF NOT EXISTS idx_principal_names_name ON principal_names(name)",
    "CREATE INDEX IF NOT EXISTS idx_individual_names_abn ON individual_names(abn)",
    "CREATE INDEX IF NOT EXISTS idx_addresses_abn ON addresses(abn)",
    "CREATE INDEX IF NOT EXISTS idx_registration_numbers_abn ON registration_numbers(abn)",
    "CREATE INDEX IF NOT EXISTS idx_tax_status_abn ON tax_status(abn)",
    "CREATE INDEX IF NOT EXISTS idx_fund_entries_abn ON fund_entries(abn)",
    "CREATE INDEX IF NOT EXISTS idx_alternate_names_abn ON alternate_names(abn)",
    "CREATE INDEX IF NOT EXISTS idx_alternate_names_name ON alternate_names(name)",
    "CREATE INDEX IF NOT EXISTS idx_ingest_files_file_name ON ingest_files(file_name)",
];

/// Base tables with a full-text mirror named `<table>_fts`
pub const MIRRORED_TABLES: [&str; 2] = ["principal_names", "alternate_names"];

/// DDL for one external-content mirror and its three sync triggers
fn mirror_statements(table: &str) -> Vec<String> {
    let fts = format!("{table}_fts");
    vec![
        format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {fts} USING fts5(\
                abn UNINDEXED, name, content='{table}', content_rowid='rowid')"
        ),
        format!(
            "CREATE TRIGGER IF NOT EXISTS {table}_ai AFTER INSERT ON {table} BEGIN \
                INSERT INTO {fts}(rowid, abn, name) VALUES (new.rowid, new.abn, new.name); \
            END"
        ),
        format!(
            "CREATE TRIGGER IF NOT EXISTS {table}_ad AFTER DELETE ON {table} BEGIN \
                INSERT INTO {fts}({fts}, rowid, abn, name) VALUES ('delete', old.rowid, old.abn, old.name); \
            END"
        ),
        format!(
            "CREATE TRIGGER IF NOT EXISTS {table}_au AFTER UPDATE ON {table} BEGIN \
                INSERT INTO {fts}({fts}, rowid, abn, name) VALUES ('delete', old.rowid, old.abn, old.name); \
                INSERT INTO {fts}(rowid, abn, name) VALUES (new.rowid, new.abn, new.name); \
            END"
        ),
    ]
}

/// Creates and maintains the store layout
#[derive(Clone)]
pub struct SchemaManager {
    pool: SqlitePool,
}

impl SchemaManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Base tables, foreign-key declarations and lookup indexes
    pub async fn ensure_schema(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for statement in TABLES.iter().chain(INDEXES) {
            debug!(statement = first_line(statement), "Applying schema statement");
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        info!(tables = TABLES.len(), indexes = INDEXES.len(), "Schema ready");
        Ok(())
    }

    /// FTS5 mirrors and the triggers that keep them in step
    pub async fn ensure_search_sync(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for table in MIRRORED_TABLES {
            for statement in mirror_statements(table) {
                debug!(statement = first_line(&statement), "Applying search statement");
                sqlx::query(&statement).execute(&mut *tx).await?;
            }
        }

        tx.commit().await?;
        info!(mirrors = MIRRORED_TABLES.len(), "Search synchronization ready");
        Ok(())
    }

    /// Both steps, in order
    pub async fn ensure_all(&self) -> Result<()> {
        self.ensure_schema().await?;
        self.ensure_search_sync().await
    }

    /// Re-derive both mirrors from their base tables
    ///
    /// Needed only for stores loaded while the triggers were absent.
    pub async fn rebuild_search_index(&self) -> Result<()> {
        for table in MIRRORED_TABLES {
            let fts = format!("{table}_fts");
            let statement = format!("INSERT INTO {fts}({fts}) VALUES ('rebuild')");
            sqlx::query(&statement).execute(&self.pool).await?;
            info!(mirror = %fts, "Search index rebuilt");
        }
        Ok(())
    }

    /// FTS5 integrity check of both mirrors against their base tables
    pub async fn check_search_index(&self) -> Result<()> {
        for table in MIRRORED_TABLES {
            let fts = format!("{table}_fts");
            let statement = format!("INSERT INTO {fts}({fts}) VALUES ('integrity-check')");
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn first_line(statement: &str) -> &str {
    statement.lines().next().unwrap_or(statement).trim()
}
