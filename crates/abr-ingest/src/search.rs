//! Read-side queries: full-text name search, exact name lookup, record
//! details and per-table counts.

use crate::error::{IngestError, Result};
use crate::models::{
    AddressRow, AlternateNameRow, EntityTypeRow, FundEntryRow, IndividualNameRow,
    PrincipalNameRow, RegistrationNumberRow, Table, TaxStatusRow,
};
use abr_common::{normalize_name, Abn};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

pub use crate::config::DEFAULT_SEARCH_LIMIT;

/// One business matching a name search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct SearchHit {
    pub abn: String,
    pub principal_name: Option<String>,
    /// The alternate name that matched, when the hit came from that mirror
    pub alternate_name: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
}

/// Everything stored for one ABN
#[derive(Debug, Clone, Serialize)]
pub struct RecordDetails {
    pub abn: String,
    pub record_last_updated_date: Option<String>,
    pub status: Option<String>,
    pub status_date: Option<String>,
    pub entity_type: Option<EntityTypeRow>,
    pub principal_name: Option<PrincipalNameRow>,
    pub individual_name: Option<IndividualNameRow>,
    pub address: Option<AddressRow>,
    pub registration_numbers: Vec<RegistrationNumberRow>,
    pub tax_status: Option<TaxStatusRow>,
    pub fund_entries: Vec<FundEntryRow>,
    pub alternate_names: Vec<AlternateNameRow>,
}

#[derive(FromRow)]
struct RecordHeader {
    abn: String,
    record_last_updated_date: Option<String>,
    status: Option<String>,
    status_date: Option<String>,
}

/// Build an FTS5 query that matches every token of `query` as a literal
///
/// Each token is quoted so FTS5 operators and punctuation in user input
/// are not interpreted. The last token matches as a prefix, so a partly
/// typed word still finds names.
pub fn fts_query(query: &str) -> Result<String> {
    let normalized = normalize_name(query);
    let mut tokens: Vec<String> = normalized
        .split(' ')
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .map(quote_fts)
        .collect();

    let Some(last) = tokens.last_mut() else {
        return Err(IngestError::InvalidQuery(query.to_string()));
    };
    last.push('*');
    Ok(tokens.join(" "))
}

fn quote_fts(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

/// Full-text search across principal and alternate names
pub async fn search_names(pool: &SqlitePool, query: &str, limit: u32) -> Result<Vec<SearchHit>> {
    let matcher = fts_query(query)?;
    let limit = if limit == 0 { DEFAULT_SEARCH_LIMIT } else { limit };

    let hits = sqlx::query_as::<_, SearchHit>(
        r#"
        WITH matches AS (
            SELECT abn, NULL AS alternate_name
            FROM principal_names_fts
            WHERE principal_names_fts MATCH ?1
            UNION
            SELECT abn, name AS alternate_name
            FROM alternate_names_fts
            WHERE alternate_names_fts MATCH ?1
        )
        SELECT DISTINCT
            m.abn AS abn,
            p.name AS principal_name,
            m.alternate_name AS alternate_name,
            a.state AS state,
            a.postcode AS postcode
        FROM matches m
        LEFT JOIN principal_names p ON p.abn = m.abn
        LEFT JOIN addresses a ON a.abn = m.abn
        ORDER BY abn, alternate_name
        LIMIT ?2
        "#,
    )
    .bind(&matcher)
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    Ok(hits)
}

/// ABNs whose principal name equals the normalized form of `name`
pub async fn find_by_normalized_name(pool: &SqlitePool, name: &str) -> Result<Vec<String>> {
    let normalized = normalize_name(name);
    if normalized.is_empty() {
        return Err(IngestError::InvalidQuery(name.to_string()));
    }

    let abns = sqlx::query_scalar::<_, String>(
        r#"
        SELECT DISTINCT p.abn
        FROM principal_names_fts f
        JOIN principal_names p ON p.rowid = f.rowid
        WHERE principal_names_fts MATCH ?1 AND p.name = ?2
        ORDER BY p.abn
        "#,
    )
    .bind(quote_fts(&normalized))
    .bind(&normalized)
    .fetch_all(pool)
    .await?;

    Ok(abns)
}

/// Assemble every stored row for one ABN, or `None` if it is unknown
pub async fn record_details(pool: &SqlitePool, abn: &str) -> Result<Option<RecordDetails>> {
    let abn = Abn::parse(abn)?;
    let abn = abn.as_str();

    let header = sqlx::query_as::<_, RecordHeader>(
        r#"
        SELECT r.abn, r.record_last_updated_date, s.status, s.status_date
        FROM abr_records r
        LEFT JOIN identity_status s ON s.abn = r.abn
        WHERE r.abn = ?1
        "#,
    )
    .bind(abn)
    .fetch_optional(pool)
    .await?;

    let Some(header) = header else {
        return Ok(None);
    };

    let entity_type = sqlx::query_as::<_, (String, String, String)>(
        "SELECT abn, entity_type_ind, entity_type_text FROM entity_type WHERE abn = ?1",
    )
    .bind(abn)
    .fetch_optional(pool)
    .await?
    .map(|(abn, entity_type_ind, entity_type_text)| EntityTypeRow {
        abn,
        entity_type_ind,
        entity_type_text,
    });

    let principal_name = sqlx::query_as::<_, (String, String, String)>(
        "SELECT abn, name_type, name FROM principal_names WHERE abn = ?1 ORDER BY rowid LIMIT 1",
    )
    .bind(abn)
    .fetch_optional(pool)
    .await?
    .map(|(abn, name_type, name)| PrincipalNameRow {
        abn,
        name_type,
        name,
    });

    let individual_name = sqlx::query_as::<_, (String, String, String, String, String)>(
        r#"
        SELECT abn, name_type, name_title, given_name, family_name
        FROM individual_names WHERE abn = ?1 ORDER BY rowid LIMIT 1
        "#,
    )
    .bind(abn)
    .fetch_optional(pool)
    .await?
    .map(
        |(abn, name_type, name_title, given_name, family_name)| IndividualNameRow {
            abn,
            name_type,
            name_title,
            given_name,
            family_name,
        },
    );

    let address = sqlx::query_as::<_, (String, String, String)>(
        "SELECT abn, state, postcode FROM addresses WHERE abn = ?1 ORDER BY rowid LIMIT 1",
    )
    .bind(abn)
    .fetch_optional(pool)
    .await?
    .map(|(abn, state, postcode)| AddressRow {
        abn,
        state,
        postcode,
    });

    let registration_numbers = sqlx::query_as::<_, (String, String, String)>(
        "SELECT abn, number, number_type FROM registration_numbers WHERE abn = ?1 ORDER BY rowid",
    )
    .bind(abn)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(abn, number, number_type)| RegistrationNumberRow {
        abn,
        number,
        number_type,
    })
    .collect();

    let tax_status = sqlx::query_as::<_, (String, String, String)>(
        "SELECT abn, status, status_date FROM tax_status WHERE abn = ?1 ORDER BY rowid LIMIT 1",
    )
    .bind(abn)
    .fetch_optional(pool)
    .await?
    .map(|(abn, status, status_date)| TaxStatusRow {
        abn,
        status,
        status_date,
    });

    let fund_entries = sqlx::query_as::<_, (String, String, String, String)>(
        "SELECT abn, status_date, name_type, name FROM fund_entries WHERE abn = ?1 ORDER BY rowid",
    )
    .bind(abn)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(abn, status_date, name_type, name)| FundEntryRow {
        abn,
        status_date,
        name_type,
        name,
    })
    .collect();

    let alternate_names = sqlx::query_as::<_, (String, String, String)>(
        "SELECT abn, name_type, name FROM alternate_names WHERE abn = ?1 ORDER BY rowid",
    )
    .bind(abn)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(abn, name_type, name)| AlternateNameRow {
        abn,
        name_type,
        name,
    })
    .collect();

    Ok(Some(RecordDetails {
        abn: header.abn,
        record_last_updated_date: header.record_last_updated_date,
        status: header.status,
        status_date: header.status_date,
        entity_type,
        principal_name,
        individual_name,
        address,
        registration_numbers,
        tax_status,
        fund_entries,
        alternate_names,
    }))
}

/// Row count of every base table, in flush order
pub async fn table_counts(pool: &SqlitePool) -> Result<Vec<(Table, i64)>> {
    let mut counts = Vec::with_capacity(Table::ALL.len());
    for table in Table::ALL {
        let statement = format!("SELECT COUNT(*) FROM {}", table.name());
        let count: i64 = sqlx::query_scalar(&statement).fetch_one(pool).await?;
        counts.push((table, count));
    }
    Ok(counts)
}
