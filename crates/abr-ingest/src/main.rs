//! ABR Ingest - load and query Australian Business Register bulk extracts

use abr_common::logging::{init_logging, LogConfig, LogLevel};
use abr_ingest::db::{self, DbConfig};
use abr_ingest::progress::ProgressObserver;
use abr_ingest::search::{self, RecordDetails, SearchHit};
use abr_ingest::{
    runlog, IngestConfig, IngestObserver, IngestSummary, IngestionOrchestrator, SchemaManager,
    Table, TracingObserver,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table as OutputTable};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "abr-ingest")]
#[command(author, version, about = "ABR bulk extract loader")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite database URL (overrides ABR_DATABASE_URL)
    #[arg(long, global = true)]
    database: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create tables, indexes and search triggers
    Schema,

    /// Load *.xml / *.xml.gz extracts from files or directories
    Ingest {
        /// Input files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Records per committed batch
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Continue with the next file after a failure
        #[arg(long)]
        continue_on_error: bool,

        /// Log progress instead of drawing spinners
        #[arg(long)]
        no_progress: bool,
    },

    /// Full-text search over business and trading names
    Search {
        /// Search terms
        query: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<u32>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show everything stored for one ABN
    Show {
        abn: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Row counts per table and recent ingest runs
    Stats {
        /// Number of recent runs to list
        #[arg(long, default_value_t = 10)]
        recent: u32,
    },

    /// Rebuild both search mirrors from their base tables
    Reindex,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the defaults chosen here
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("abr-ingest")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    let mut config = IngestConfig::from_env().context("Failed to load configuration")?;
    if let Some(database) = cli.database {
        config.database_url = database;
    }

    match cli.command {
        Command::Schema => {
            let pool = connect(&config).await?;
            SchemaManager::new(pool).ensure_all().await?;
            info!(database = %config.database_url, "Schema ensured");
        }
        Command::Ingest {
            paths,
            batch_size,
            continue_on_error,
            no_progress,
        } => {
            if let Some(size) = batch_size {
                config.batch_size = size;
            }
            config.continue_on_error |= continue_on_error;
            config.validate()?;

            let pool = connect(&config).await?;
            let observer: Arc<dyn IngestObserver> = if no_progress {
                Arc::new(TracingObserver)
            } else {
                Arc::new(ProgressObserver::new())
            };

            let summary = IngestionOrchestrator::new(pool, config)
                .with_observer(observer)
                .run(&paths)
                .await?;

            print_summary(&summary);
            if !summary.is_clean() {
                bail!("{} file(s) failed", summary.failures.len());
            }
        }
        Command::Search { query, limit, json } => {
            let pool = connect(&config).await?;
            let hits =
                search::search_names(&pool, &query, limit.unwrap_or(config.search_limit)).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                print_hits(&hits);
            }
        }
        Command::Show { abn, json } => {
            let pool = connect(&config).await?;
            let Some(details) = search::record_details(&pool, &abn).await? else {
                bail!("ABN {abn} not found");
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&details)?);
            } else {
                print_details(&details);
            }
        }
        Command::Stats { recent } => {
            let pool = connect(&config).await?;
            print_stats(&pool, recent).await?;
        }
        Command::Reindex => {
            let pool = connect(&config).await?;
            let schema = SchemaManager::new(pool);
            schema.ensure_search_sync().await?;
            schema.rebuild_search_index().await?;
        }
    }

    Ok(())
}

async fn connect(config: &IngestConfig) -> Result<SqlitePool> {
    let pool = db::create_pool(&DbConfig::from(config))
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    db::health_check(&pool)
        .await
        .with_context(|| format!("Database {} is not responding", config.database_url))?;
    Ok(pool)
}

fn new_table() -> OutputTable {
    let mut table = OutputTable::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);
    table
}

fn print_summary(summary: &IngestSummary) {
    let mut table = new_table();
    table.set_header(vec!["File", "Records", "Skipped", "Batches", "Rows", "Seconds"]);

    for report in &summary.files {
        table.add_row(vec![
            report.file.display().to_string(),
            report.records_seen.to_string(),
            report.records_skipped.to_string(),
            report.batches.to_string(),
            report.total_rows().to_string(),
            format!("{:.1}", report.elapsed.as_secs_f64()),
        ]);
    }
    for failure in &summary.failures {
        table.add_row(vec![
            failure.file.display().to_string(),
            "failed".to_string(),
            String::new(),
            String::new(),
            String::new(),
            failure.error.clone(),
        ]);
    }

    println!("{table}");
    println!(
        "{} records, {} skipped, {} principal names, {} alternate names in {:.1}s",
        summary.records_seen(),
        summary.records_skipped(),
        summary.rows_for(Table::PrincipalNames),
        summary.rows_for(Table::AlternateNames),
        summary.elapsed.as_secs_f64()
    );
}

fn print_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No matches");
        return;
    }

    let mut table = new_table();
    table.set_header(vec!["ABN", "Name", "Matched other name", "State", "Postcode"]);
    for hit in hits {
        table.add_row(vec![
            hit.abn.clone(),
            hit.principal_name.clone().unwrap_or_default(),
            hit.alternate_name.clone().unwrap_or_default(),
            hit.state.clone().unwrap_or_default(),
            hit.postcode.clone().unwrap_or_default(),
        ]);
    }
    println!("{table}");
}

fn print_details(details: &RecordDetails) {
    let mut table = new_table();
    let mut row = |field: &str, value: String| {
        if !value.is_empty() {
            table.add_row(vec![field.to_string(), value]);
        }
    };

    row("ABN", details.abn.clone());
    row("Status", details.status.clone().unwrap_or_default());
    row("Status from", details.status_date.clone().unwrap_or_default());
    row(
        "Last updated",
        details.record_last_updated_date.clone().unwrap_or_default(),
    );
    if let Some(entity) = &details.entity_type {
        row(
            "Entity type",
            format!("{} ({})", entity.entity_type_text, entity.entity_type_ind),
        );
    }
    if let Some(name) = &details.principal_name {
        row("Name", format!("{} [{}]", name.name, name.name_type));
    }
    if let Some(person) = &details.individual_name {
        let full = [&person.name_title, &person.given_name, &person.family_name]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        row("Individual", full);
    }
    if let Some(address) = &details.address {
        row("Address", format!("{} {}", address.state, address.postcode).trim().to_string());
    }
    for number in &details.registration_numbers {
        row("ASIC number", format!("{} ({})", number.number, number.number_type));
    }
    if let Some(gst) = &details.tax_status {
        row("GST", format!("{} from {}", gst.status, gst.status_date));
    }
    for fund in &details.fund_entries {
        row("DGR", format!("{} from {}", fund.name, fund.status_date).trim().to_string());
    }
    for other in &details.alternate_names {
        row("Other name", format!("{} [{}]", other.name, other.name_type));
    }

    println!("{table}");
}

async fn print_stats(pool: &SqlitePool, recent: u32) -> Result<()> {
    let mut counts = new_table();
    counts.set_header(vec!["Table", "Rows"]);
    for (table, rows) in search::table_counts(pool).await? {
        counts.add_row(vec![table.name().to_string(), rows.to_string()]);
    }
    println!("{counts}");

    let entries = runlog::recent_files(pool, recent).await?;
    if entries.is_empty() {
        return Ok(());
    }

    let mut runs = new_table();
    runs.set_header(vec!["File", "Status", "Records", "Rows", "Started", "Error"]);
    for entry in entries {
        runs.add_row(vec![
            entry.file_name,
            entry.status,
            entry.records_seen.to_string(),
            entry.rows_inserted.to_string(),
            entry.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.error.unwrap_or_default(),
        ]);
    }
    println!("{runs}");
    Ok(())
}
