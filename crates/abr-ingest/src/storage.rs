// Batched Transactional Writer

use crate::config::DEFAULT_BATCH_SIZE;
use crate::models::{
    AbrRecordRow, AddressRow, AlternateNameRow, EntityTypeRow, FundEntryRow, IdentityStatusRow,
    IndividualNameRow, NormalizedRecord, PrincipalNameRow, RegistrationNumberRow, Table,
    TaxStatusRow,
};
use serde::Serialize;
use sqlx::query_builder::Separated;
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// SQLITE_MAX_VARIABLE_NUMBER default since SQLite 3.32
pub const SQLITE_MAX_BIND_PARAMS: usize = 32_766;

// ============================================================================
// Statistics
// ============================================================================

/// Outcome of one committed batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushStats {
    /// Source records in the batch
    pub records: usize,

    /// Rows the store accepted per table; ignored duplicates are not counted
    pub rows_inserted: BTreeMap<Table, u64>,

    #[serde(skip)]
    pub elapsed: Duration,
}

impl FlushStats {
    pub fn total_rows(&self) -> u64 {
        self.rows_inserted.values().sum()
    }

    pub fn merge(&mut self, other: &FlushStats) {
        self.records += other.records;
        for (table, rows) in &other.rows_inserted {
            *self.rows_inserted.entry(*table).or_default() += rows;
        }
        self.elapsed += other.elapsed;
    }
}

// ============================================================================
// Row Binding
// ============================================================================

/// A row type with a fixed target table and column order
pub trait TableRow {
    const TABLE: Table;
    const COLUMNS: &'static [&'static str];

    fn bind_columns<'qb, 'args>(&'args self, row: &mut Separated<'qb, 'args, Sqlite, &'static str>);
}

macro_rules! table_row {
    ($row:ty, $table:expr, [$($column:ident),+ $(,)?]) => {
        impl TableRow for $row {
            const TABLE: Table = $table;
            const COLUMNS: &'static [&'static str] = &[$(stringify!($column)),+];

            fn bind_columns<'qb, 'args>(
                &'args self,
                row: &mut Separated<'qb, 'args, Sqlite, &'static str>,
            ) {
                $(row.push_bind(self.$column.as_str());)+
            }
        }
    };
}

table_row!(AbrRecordRow, Table::AbrRecords, [abn, record_last_updated_date]);
table_row!(IdentityStatusRow, Table::IdentityStatus, [abn, status, status_date]);
table_row!(EntityTypeRow, Table::EntityType, [abn, entity_type_ind, entity_type_text]);
table_row!(PrincipalNameRow, Table::PrincipalNames, [abn, name_type, name]);
table_row!(
    IndividualNameRow,
    Table::IndividualNames,
    [abn, name_type, name_title, given_name, family_name]
);
table_row!(AddressRow, Table::Addresses, [abn, state, postcode]);
table_row!(RegistrationNumberRow, Table::RegistrationNumbers, [abn, number, number_type]);
table_row!(TaxStatusRow, Table::TaxStatus, [abn, status, status_date]);
table_row!(FundEntryRow, Table::FundEntries, [abn, status_date, name_type, name]);
table_row!(AlternateNameRow, Table::AlternateNames, [abn, name_type, name]);

/// Rows per multi-row INSERT that keep the statement under the bind limit
pub fn chunk_size_for(columns: usize) -> usize {
    (SQLITE_MAX_BIND_PARAMS / columns.max(1)).max(1)
}

/// Insert `rows` with chunked `INSERT OR IGNORE` inside an open transaction
///
/// Returns the number of rows the store accepted.
pub async fn insert_rows<T: TableRow>(
    tx: &mut Transaction<'_, Sqlite>,
    rows: &[T],
) -> Result<u64, sqlx::Error> {
    if rows.is_empty() {
        return Ok(0);
    }

    let chunk_size = chunk_size_for(T::COLUMNS.len());
    let mut inserted = 0;

    for chunk in rows.chunks(chunk_size) {
        let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "INSERT OR IGNORE INTO {} ({}) ",
            T::TABLE.name(),
            T::COLUMNS.join(", ")
        ));

        query_builder.push_values(chunk, |mut b, row| {
            row.bind_columns(&mut b);
        });

        let result = query_builder.build().execute(&mut **tx).await?;
        inserted += result.rows_affected();
    }

    debug!(table = %T::TABLE, rows = rows.len(), inserted, "Inserted rows");
    Ok(inserted)
}

// ============================================================================
// Pending Rows
// ============================================================================

#[derive(Debug, Default)]
struct PendingRows {
    records: Vec<AbrRecordRow>,
    identity: Vec<IdentityStatusRow>,
    entity_types: Vec<EntityTypeRow>,
    principal_names: Vec<PrincipalNameRow>,
    individual_names: Vec<IndividualNameRow>,
    addresses: Vec<AddressRow>,
    registration_numbers: Vec<RegistrationNumberRow>,
    tax_status: Vec<TaxStatusRow>,
    fund_entries: Vec<FundEntryRow>,
    alternate_names: Vec<AlternateNameRow>,
}

impl PendingRows {
    fn push(&mut self, record: NormalizedRecord) {
        self.records.push(record.record);
        self.identity.push(record.identity);
        self.entity_types.extend(record.entity_type);
        self.principal_names.extend(record.principal_name);
        self.individual_names.extend(record.individual_name);
        self.addresses.extend(record.address);
        self.registration_numbers.extend(record.registration_numbers);
        self.tax_status.extend(record.tax_status);
        self.fund_entries.extend(record.fund_entries);
        self.alternate_names.extend(record.alternate_names);
    }

    /// Write every table, parent rows first
    async fn write(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
    ) -> Result<BTreeMap<Table, u64>, sqlx::Error> {
        let mut inserted = BTreeMap::new();
        inserted.insert(Table::AbrRecords, insert_rows(tx, &self.records).await?);
        inserted.insert(Table::IdentityStatus, insert_rows(tx, &self.identity).await?);
        inserted.insert(Table::EntityType, insert_rows(tx, &self.entity_types).await?);
        inserted.insert(Table::PrincipalNames, insert_rows(tx, &self.principal_names).await?);
        inserted.insert(Table::IndividualNames, insert_rows(tx, &self.individual_names).await?);
        inserted.insert(Table::Addresses, insert_rows(tx, &self.addresses).await?);
        inserted.insert(
            Table::RegistrationNumbers,
            insert_rows(tx, &self.registration_numbers).await?,
        );
        inserted.insert(Table::TaxStatus, insert_rows(tx, &self.tax_status).await?);
        inserted.insert(Table::FundEntries, insert_rows(tx, &self.fund_entries).await?);
        inserted.insert(Table::AlternateNames, insert_rows(tx, &self.alternate_names).await?);
        Ok(inserted)
    }
}

// ============================================================================
// Batch Writer
// ============================================================================

/// Accumulates normalized records and commits them in atomic batches
///
/// Each flush writes every pending row in one transaction. If any statement
/// fails the transaction is dropped uncommitted, so nothing from that batch
/// reaches the store, and the pending rows are discarded.
pub struct BatchWriter {
    pool: SqlitePool,
    batch_size: usize,
    pending: PendingRows,
    pending_records: usize,
}

impl BatchWriter {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_batch_size(pool, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(pool: SqlitePool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
            pending: PendingRows::default(),
            pending_records: 0,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Records added since the last flush
    pub fn pending_records(&self) -> usize {
        self.pending_records
    }

    /// Queue one record, flushing when the batch threshold is reached
    ///
    /// Returns the stats of the batch this call committed, if any.
    pub async fn add(&mut self, record: NormalizedRecord) -> Result<Option<FlushStats>, sqlx::Error> {
        self.pending.push(record);
        self.pending_records += 1;

        if self.pending_records >= self.batch_size {
            return self.flush().await.map(Some);
        }
        Ok(None)
    }

    /// Commit everything pending as one transaction
    pub async fn flush(&mut self) -> Result<FlushStats, sqlx::Error> {
        let pending = std::mem::take(&mut self.pending);
        let records = std::mem::take(&mut self.pending_records);

        if records == 0 {
            return Ok(FlushStats::default());
        }

        let started = Instant::now();
        let mut tx = self.pool.begin().await?;
        let rows_inserted = pending.write(&mut tx).await?;
        tx.commit().await?;

        let stats = FlushStats {
            records,
            rows_inserted,
            elapsed: started.elapsed(),
        };

        debug!(
            records,
            rows = stats.total_rows(),
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Batch committed"
        );

        Ok(stats)
    }

    /// Flush the trailing partial batch at end of stream
    pub async fn finish(mut self) -> Result<FlushStats, sqlx::Error> {
        self.flush().await
    }
}
