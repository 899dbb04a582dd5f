//! Shared fixtures for integration tests

#![allow(dead_code)]

use abr_ingest::{db, IngestConfig, IngestionOrchestrator, NoopObserver, SchemaManager};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const FOREST_COACH_LINES: &str = r#"
  <ABR recordLastUpdatedDate="20190513" replaced="N">
    <ABN status="ACT" ABNStatusFromDate="20000101">11000037409</ABN>
    <EntityType>
      <EntityTypeInd>PRV</EntityTypeInd>
      <EntityTypeText>Australian Private Company</EntityTypeText>
    </EntityType>
    <MainEntity>
      <NonIndividualName type="MN">
        <NonIndividualNameText>Forest Coach Lines Pty Ltd</NonIndividualNameText>
      </NonIndividualName>
      <BusinessAddress>
        <AddressDetails>
          <State>NSW</State>
          <Postcode>2084</Postcode>
        </AddressDetails>
      </BusinessAddress>
    </MainEntity>
    <ASICNumber ASICNumberType="undetermined">000037409</ASICNumber>
    <GST status="ACT" GSTStatusFromDate="20000701" />
    <OtherEntity>
      <NonIndividualName type="BN">
        <NonIndividualNameText>CDC NSW Mid North Coast</NonIndividualNameText>
      </NonIndividualName>
    </OtherEntity>
    <OtherEntity>
      <NonIndividualName type="BN">
        <NonIndividualNameText>Woopi Connect</NonIndividualNameText>
      </NonIndividualName>
    </OtherEntity>
  </ABR>"#;

pub const SOLE_TRADER: &str = r#"
  <ABR recordLastUpdatedDate="20210202">
    <ABN status="CAN" ABNStatusFromDate="20120101">22111222333</ABN>
    <EntityType>
      <EntityTypeInd>IND</EntityTypeInd>
      <EntityTypeText>Individual/Sole Trader</EntityTypeText>
    </EntityType>
    <LegalEntity>
      <IndividualName type="LGL">
        <NameTitle>MS</NameTitle>
        <GivenName>Jane</GivenName>
        <GivenName>Mary</GivenName>
        <FamilyName>Citizen</FamilyName>
      </IndividualName>
      <BusinessAddress>
        <AddressDetails><State>VIC</State><Postcode>3000</Postcode></AddressDetails>
      </BusinessAddress>
    </LegalEntity>
    <OtherEntity>
      <NonIndividualName type="TRD">
        <NonIndividualNameText>Jane's Woopi Bakery</NonIndividualNameText>
      </NonIndividualName>
    </OtherEntity>
    <OtherEntity>
      <NonIndividualName type="LGL">
        <NonIndividualNameText>Should Not Appear</NonIndividualNameText>
      </NonIndividualName>
    </OtherEntity>
  </ABR>"#;

pub const CHARITY: &str = r#"
  <ABR recordLastUpdatedDate="20220303">
    <ABN status="ACT" ABNStatusFromDate="20050505">33222333444</ABN>
    <MainEntity>
      <NonIndividualName type="MN">
        <NonIndividualNameText>Harbour  Relief   Fund</NonIndividualNameText>
      </NonIndividualName>
    </MainEntity>
    <DGR DGRStatusFromDate="20060101">
      <NonIndividualName type="DGR">
        <NonIndividualNameText>Harbour Relief Public Fund</NonIndividualNameText>
      </NonIndividualName>
    </DGR>
  </ABR>"#;

pub const MISSING_ABN: &str = r#"
  <ABR recordLastUpdatedDate="20230101">
    <ABN status="ACT" ABNStatusFromDate="20230101"></ABN>
    <MainEntity>
      <NonIndividualName type="MN">
        <NonIndividualNameText>Ghost Holdings</NonIndividualNameText>
      </NonIndividualName>
    </MainEntity>
  </ABR>"#;

/// One revision of ABN 44555666777 with the given status and entity type
pub fn revision(status: &str, entity_type_ind: &str, updated: &str) -> String {
    format!(
        r#"
  <ABR recordLastUpdatedDate="{updated}">
    <ABN status="{status}" ABNStatusFromDate="{updated}">44555666777</ABN>
    <EntityType>
      <EntityTypeInd>{entity_type_ind}</EntityTypeInd>
      <EntityTypeText>Revision {updated}</EntityTypeText>
    </EntityType>
    <MainEntity>
      <NonIndividualName type="MN">
        <NonIndividualNameText>Revision Holdings {updated}</NonIndividualNameText>
      </NonIndividualName>
    </MainEntity>
  </ABR>"#
    )
}

/// Wrap record elements in a bulk extract document
pub fn document(records: &[&str]) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Transfer>{}\n</Transfer>\n",
        records.concat()
    )
}

/// `count` minimal organisation records with consecutive ABNs
pub fn numbered_records(count: usize) -> String {
    (0..count)
        .map(|i| {
            format!(
                r#"<ABR recordLastUpdatedDate="20240101"><ABN status="ACT">{:011}</ABN><MainEntity><NonIndividualName type="MN"><NonIndividualNameText>Company {i}</NonIndividualNameText></NonIndividualName></MainEntity></ABR>"#,
                50_000_000_000u64 + i as u64
            )
        })
        .collect()
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

pub async fn setup_pool() -> SqlitePool {
    let pool = db::connect_in_memory().await.unwrap();
    SchemaManager::new(pool.clone()).ensure_all().await.unwrap();
    pool
}

pub fn orchestrator(pool: &SqlitePool, batch_size: usize) -> IngestionOrchestrator {
    let config = IngestConfig::builder()
        .database_url("sqlite::memory:")
        .batch_size(batch_size)
        .build();
    IngestionOrchestrator::new(pool.clone(), config).with_observer(Arc::new(NoopObserver))
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn fts_hits(pool: &SqlitePool, mirror: &str, term: &str) -> i64 {
    sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {mirror} WHERE {mirror} MATCH ?1"
    ))
    .bind(term)
    .fetch_one(pool)
    .await
    .unwrap()
}
