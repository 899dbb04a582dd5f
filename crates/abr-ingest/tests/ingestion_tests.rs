//! End-to-end ingestion: file -> parser -> normalizer -> batched writes

mod common;

use abr_ingest::{runlog, IngestError, Table};
use common::*;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

#[tokio::test]
async fn test_forest_coach_lines_scenario() {
    let pool = setup_pool().await;
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "20240101_Public01.xml", &document(&[FOREST_COACH_LINES]));

    let summary = orchestrator(&pool, 100).run(&[file]).await.unwrap();
    assert_eq!(summary.records_seen(), 1);
    assert_eq!(summary.records_skipped(), 0);

    assert_eq!(count(&pool, "abr_records").await, 1);
    assert_eq!(count(&pool, "identity_status").await, 1);

    let principal: (String, String) =
        sqlx::query_as("SELECT abn, name FROM principal_names")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(principal, ("11000037409".into(), "forest coach lines pty ltd".into()));

    let address: (String, String) = sqlx::query_as("SELECT state, postcode FROM addresses")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(address, ("NSW".into(), "2084".into()));

    let alternates: Vec<(String, String)> =
        sqlx::query_as("SELECT name_type, name FROM alternate_names ORDER BY rowid")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(
        alternates,
        vec![
            ("BN".into(), "cdc nsw mid north coast".into()),
            ("BN".into(), "woopi connect".into()),
        ]
    );

    let status: (String, String) =
        sqlx::query_as("SELECT status, status_date FROM identity_status WHERE abn = '11000037409'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, ("ACT".into(), "20000101".into()));

    assert_eq!(count(&pool, "registration_numbers").await, 1);
    assert_eq!(count(&pool, "tax_status").await, 1);
    assert_eq!(fts_hits(&pool, "alternate_names_fts", "woopi").await, 1);
}

#[tokio::test]
async fn test_skips_records_without_abn() {
    let pool = setup_pool().await;
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(
        dir.path(),
        "mixed.xml",
        &document(&[MISSING_ABN, CHARITY, MISSING_ABN]),
    );

    let report = orchestrator(&pool, 10).ingest_file(&file).await.unwrap();
    assert_eq!(report.records_seen, 3);
    assert_eq!(report.records_skipped, 2);

    assert_eq!(count(&pool, "abr_records").await, 1);
    let ghosts: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM principal_names WHERE name LIKE '%ghost%'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(ghosts, 0);
}

#[tokio::test]
async fn test_individuals_and_fund_entries() {
    let pool = setup_pool().await;
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "people.xml", &document(&[SOLE_TRADER, CHARITY]));

    orchestrator(&pool, 10).run(&[file]).await.unwrap();

    let person: (String, String, String, String) = sqlx::query_as(
        "SELECT name_type, name_title, given_name, family_name FROM individual_names",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(
        person,
        ("LGL".into(), "MS".into(), "Jane Mary".into(), "Citizen".into())
    );

    // Individuals never get a searchable principal name
    let principal_abns: Vec<String> = sqlx::query_scalar("SELECT abn FROM principal_names")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(principal_abns, vec!["33222333444".to_string()]);

    let fund: (String, String, String) =
        sqlx::query_as("SELECT status_date, name_type, name FROM fund_entries")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(
        fund,
        ("20060101".into(), "DGR".into(), "Harbour Relief Public Fund".into())
    );
}

#[tokio::test]
async fn test_disallowed_alternate_types_never_stored() {
    let pool = setup_pool().await;
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "trader.xml", &document(&[SOLE_TRADER]));

    orchestrator(&pool, 10).run(&[file]).await.unwrap();

    let types: Vec<String> = sqlx::query_scalar("SELECT DISTINCT name_type FROM alternate_names")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(types, vec!["TRD".to_string()]);
    assert_eq!(fts_hits(&pool, "alternate_names_fts", "appear").await, 0);
}

#[tokio::test]
async fn test_reingest_keeps_keyed_tables_and_doubles_child_rows() {
    let pool = setup_pool().await;
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(
        dir.path(),
        "snapshot.xml",
        &document(&[FOREST_COACH_LINES, SOLE_TRADER]),
    );
    let orchestrator = orchestrator(&pool, 10);

    orchestrator.run(&[file.clone()]).await.unwrap();
    let first_alternates = count(&pool, "alternate_names").await;
    let first_addresses = count(&pool, "addresses").await;

    let second = orchestrator.ingest_file(&file).await.unwrap();

    assert_eq!(count(&pool, "abr_records").await, 2);
    assert_eq!(count(&pool, "identity_status").await, 2);
    assert_eq!(count(&pool, "entity_type").await, 2);
    assert_eq!(count(&pool, "alternate_names").await, first_alternates * 2);
    assert_eq!(count(&pool, "addresses").await, first_addresses * 2);

    // Ignored duplicates are not reported as inserted
    assert_eq!(second.rows_for(Table::AbrRecords), 0);
    assert_eq!(second.rows_for(Table::AlternateNames) as i64, first_alternates);
}

async fn keyed_values(pool: &sqlx::SqlitePool) -> (String, String, String, String) {
    sqlx::query_as(
        r#"
        SELECT r.record_last_updated_date, s.status, s.status_date, e.entity_type_ind
        FROM abr_records r
        JOIN identity_status s ON s.abn = r.abn
        JOIN entity_type e ON e.abn = r.abn
        WHERE r.abn = '44555666777'
        "#,
    )
    .fetch_one(pool)
    .await
    .unwrap()
}

fn first_seen() -> (String, String, String, String) {
    ("20100101".into(), "ACT".into(), "20100101".into(), "PRV".into())
}

#[tokio::test]
async fn test_keyed_tables_keep_first_seen_row_within_batch() {
    let pool = setup_pool().await;
    let dir = tempfile::tempdir().unwrap();
    let older = revision("ACT", "PRV", "20100101");
    let newer = revision("CAN", "PUB", "20200101");
    let file = write_file(
        dir.path(),
        "revisions.xml",
        &document(&[older.as_str(), newer.as_str()]),
    );

    let report = orchestrator(&pool, 10).ingest_file(&file).await.unwrap();
    assert_eq!(report.batches, 1);
    assert_eq!(report.rows_for(Table::IdentityStatus), 1);
    assert_eq!(report.rows_for(Table::PrincipalNames), 2);

    assert_eq!(count(&pool, "identity_status").await, 1);
    assert_eq!(count(&pool, "entity_type").await, 1);
    assert_eq!(keyed_values(&pool).await, first_seen());
}

#[tokio::test]
async fn test_keyed_tables_keep_first_seen_row_across_batches() {
    let pool = setup_pool().await;
    let dir = tempfile::tempdir().unwrap();
    let older = revision("ACT", "PRV", "20100101");
    let newer = revision("CAN", "PUB", "20200101");
    let file = write_file(
        dir.path(),
        "revisions.xml",
        &document(&[older.as_str(), newer.as_str()]),
    );

    let report = orchestrator(&pool, 1).ingest_file(&file).await.unwrap();
    assert_eq!(report.batches, 2);
    assert_eq!(keyed_values(&pool).await, first_seen());
}

#[tokio::test]
async fn test_keyed_tables_keep_first_seen_row_across_files() {
    let pool = setup_pool().await;
    let dir = tempfile::tempdir().unwrap();
    let second = write_file(
        dir.path(),
        "b_Public02.xml",
        &document(&[revision("CAN", "PUB", "20200101").as_str()]),
    );
    let first = write_file(
        dir.path(),
        "a_Public01.xml",
        &document(&[revision("ACT", "PRV", "20100101").as_str()]),
    );

    // Lexicographic order wins over argument order
    let summary = orchestrator(&pool, 10).run(&[second, first]).await.unwrap();
    let order: Vec<_> = summary
        .files
        .iter()
        .map(|f| f.file.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(order, vec!["a_Public01.xml", "b_Public02.xml"]);

    assert_eq!(count(&pool, "abr_records").await, 1);
    assert_eq!(count(&pool, "principal_names").await, 2);
    assert_eq!(keyed_values(&pool).await, first_seen());
}

#[tokio::test]
async fn test_exact_threshold_and_trailing_flush() {
    let pool = setup_pool().await;
    let dir = tempfile::tempdir().unwrap();
    let exact = write_file(dir.path(), "a_exact.xml", &document(&[numbered_records(6).as_str()]));

    let report = orchestrator(&pool, 3).ingest_file(&exact).await.unwrap();
    assert_eq!(report.batches, 2);
    assert_eq!(count(&pool, "abr_records").await, 6);

    let pool = setup_pool().await;
    let partial = write_file(dir.path(), "b_partial.xml", &document(&[numbered_records(7).as_str()]));

    let report = orchestrator(&pool, 3).ingest_file(&partial).await.unwrap();
    assert_eq!(report.batches, 3);
    assert_eq!(report.rows_for(Table::PrincipalNames), 7);
    assert_eq!(count(&pool, "abr_records").await, 7);
    assert_eq!(count(&pool, "principal_names").await, 7);
}

#[tokio::test]
async fn test_malformed_file_keeps_committed_batches() {
    let pool = setup_pool().await;
    let dir = tempfile::tempdir().unwrap();
    let broken = format!(
        "<Transfer>{}<ABR><ABN>99</Name></ABR></Transfer>",
        numbered_records(5)
    );
    let file = write_file(dir.path(), "broken.xml", &broken);

    let err = orchestrator(&pool, 2).run(&[file]).await.unwrap_err();
    match &err {
        IngestError::MalformedInput { file, records, .. } => {
            assert!(file.ends_with("broken.xml"));
            assert_eq!(*records, 5);
        }
        other => panic!("expected MalformedInput, got {other:?}"),
    }
    assert!(err.to_string().contains("broken.xml"));

    // Two full batches committed; the fifth record was still pending
    assert_eq!(count(&pool, "abr_records").await, 4);

    let entries = runlog::recent_files(&pool, 1).await.unwrap();
    assert_eq!(entries[0].status, "failed");
    assert_eq!(entries[0].records_seen, 5);
}

#[tokio::test]
async fn test_write_failure_rolls_back_batch() {
    let pool = setup_pool().await;
    sqlx::query("DROP TABLE addresses").execute(&pool).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let file = write_file(dir.path(), "forest.xml", &document(&[FOREST_COACH_LINES]));

    let err = orchestrator(&pool, 10).ingest_file(&file).await.unwrap_err();
    match err {
        IngestError::WriteFailure {
            position, records, ..
        } => {
            assert_eq!(records, 1);
            assert!(position > 0);
        }
        other => panic!("expected write failure, got {other}"),
    }
    assert_eq!(count(&pool, "abr_records").await, 0);
    assert_eq!(count(&pool, "principal_names").await, 0);
}

#[tokio::test]
async fn test_continue_on_error_moves_to_next_file() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a_broken.xml", "<Transfer><ABR><ABN>1</ABN>");
    write_file(dir.path(), "b_good.xml", &document(&[CHARITY]));

    let pool = setup_pool().await;
    let err = orchestrator(&pool, 10)
        .run(&[dir.path().to_path_buf()])
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::MalformedInput { .. }));
    assert_eq!(count(&pool, "abr_records").await, 0);

    let pool = setup_pool().await;
    let config = abr_ingest::IngestConfig::builder()
        .batch_size(10)
        .continue_on_error(true)
        .build();
    let summary = abr_ingest::IngestionOrchestrator::new(pool.clone(), config)
        .run(&[dir.path().to_path_buf()])
        .await
        .unwrap();

    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].file.ends_with("a_broken.xml"));
    assert_eq!(summary.files.len(), 1);
    assert_eq!(count(&pool, "abr_records").await, 1);
}

#[tokio::test]
async fn test_gzip_input() {
    let pool = setup_pool().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("20240101_Public02.xml.gz");

    let mut encoder = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::fast());
    encoder
        .write_all(document(&[FOREST_COACH_LINES, CHARITY]).as_bytes())
        .unwrap();
    encoder.finish().unwrap();

    let summary = orchestrator(&pool, 10)
        .run(&[dir.path().to_path_buf()])
        .await
        .unwrap();
    assert_eq!(summary.records_seen(), 2);
    assert_eq!(count(&pool, "abr_records").await, 2);
}
