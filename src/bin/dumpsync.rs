//! dumpsync CLI - extract tables from a SQL dump and reconcile employees
//!
//! `extract` writes selected dump tables as JSON files; `reconcile` merges
//! the employee table with the roster and the document store.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;

use dumpsync::config::{resolve_store_config, StoreOverrides, SyncConfig};
use dumpsync::dump::{extract_tables, read_dump, TableOutcome};
use dumpsync::pipeline::ReconcileJob;
use dumpsync::roster::{Roster, RosterGrid};
use dumpsync::serialization::{write_json_file, write_table, OutputFormat};
use dumpsync::store::StoreClient;

#[derive(Parser)]
#[command(name = "dumpsync")]
#[command(version, about = "SQL dump extraction and employee reconciliation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract tables from a dump into JSON files
    Extract {
        /// Path to the SQL dump
        #[arg(short, long)]
        dump: PathBuf,

        /// Table to extract (repeatable; defaults to the config file's list)
        #[arg(short, long = "table")]
        tables: Vec<String>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (json or ndjson)
        #[arg(short, long)]
        format: Option<OutputFormat>,

        /// Keep only rows whose id is greater than this value
        #[arg(long)]
        min_id: Option<i64>,

        /// Path to dumpsync.yaml
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Reconcile employees from the dump and roster into the store
    Reconcile {
        /// Path to the SQL dump
        #[arg(short, long)]
        dump: PathBuf,

        /// Roster CSV export
        #[arg(short, long)]
        roster: PathBuf,

        /// Compute everything but skip writes
        #[arg(long)]
        dry_run: bool,

        /// Skip TLS certificate verification
        #[arg(long)]
        insecure: bool,

        /// Path to dumpsync.yaml
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Store base URL (overrides environment and config file)
        #[arg(long)]
        store_url: Option<String>,

        /// Store API key (overrides environment and config file)
        #[arg(long)]
        api_key: Option<String>,

        /// Web app config script to read apiKey/baseUrl from
        #[arg(long)]
        web_config: Option<PathBuf>,

        /// Write the JSON run report here
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extract { dump, tables, output, format, min_id, config } => {
            extract(dump, tables, output, format, min_id, config)
        }
        Commands::Reconcile {
            dump,
            roster,
            dry_run,
            insecure,
            config,
            store_url,
            api_key,
            web_config,
            report,
        } => {
            let overrides = StoreOverrides {
                base_url: store_url,
                api_key,
                insecure_tls: insecure,
                web_config,
            };
            reconcile(dump, roster, dry_run, overrides, config, report).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<SyncConfig, String> {
    SyncConfig::load_or_default(path).map_err(|e| format!("Failed to load config: {}", e))
}

/// Extract tables to `<output>/<table>.json`
fn extract(
    dump: PathBuf,
    tables: Vec<String>,
    output: Option<PathBuf>,
    format: Option<OutputFormat>,
    min_id: Option<i64>,
    config: Option<PathBuf>,
) -> Result<(), String> {
    let config = load_config(config.as_deref())?;

    let tables = if tables.is_empty() { config.extract.tables.clone() } else { tables };
    if tables.is_empty() {
        return Err("No tables to extract (pass --table or list extract.tables in the config)".to_string());
    }
    let output = output
        .or_else(|| config.extract.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("exports"));
    let format = match format {
        Some(format) => format,
        None => config
            .extract
            .format
            .as_deref()
            .map(str::parse::<OutputFormat>)
            .transpose()?
            .unwrap_or_default(),
    };
    let min_id = min_id.or(config.extract.min_id);

    println!("📖 Reading {}...", dump.display());
    let text = read_dump(&dump).map_err(|e| format!("Failed to read dump {}: {}", dump.display(), e))?;

    let mut summary = extract_tables(&text, &tables);
    for outcome in &mut summary.outcomes {
        match outcome {
            TableOutcome::Extracted(extraction) => {
                if let Some(min_id) = min_id {
                    extraction.retain_min_id(&config.extract.id_column, min_id);
                }
                let path = write_table(extraction, &output, format)
                    .map_err(|e| format!("Failed to write {}: {}", extraction.table, e))?;
                println!(
                    "  ✓ {}: {} records → {}",
                    extraction.table,
                    extraction.records.len(),
                    path.display()
                );
                if extraction.dropped_rows > 0 {
                    println!("    ⚠ {} rows dropped (column count mismatch)", extraction.dropped_rows);
                }
                if extraction.filtered_rows > 0 {
                    println!("    ℹ {} rows at or below id {}", extraction.filtered_rows, min_id.unwrap_or_default());
                }
            }
            TableOutcome::Absent { table } => println!("  ℹ {}: not in dump", table),
            TableOutcome::Failed { table, reason } => println!("  ✗ {}: {}", table, reason),
        }
    }

    println!("\n✨ Extracted {} records from {} tables", summary.total_records(), summary.extracted().count());
    if !summary.failed_tables().is_empty() {
        return Err(format!("{} table(s) failed to parse", summary.failed_tables().len()));
    }
    Ok(())
}

/// Reconcile employees and write them to the store
async fn reconcile(
    dump: PathBuf,
    roster_path: PathBuf,
    dry_run: bool,
    overrides: StoreOverrides,
    config: Option<PathBuf>,
    report_path: Option<PathBuf>,
) -> Result<(), String> {
    let config = load_config(config.as_deref())?;
    let store_config = resolve_store_config(&config, &overrides, |key| std::env::var(key).ok())
        .map_err(|e| format!("Failed to configure store: {}", e))?;
    let store = StoreClient::new(&store_config).map_err(|e| e.to_string())?;

    println!("📖 Reading {}...", dump.display());
    let text = read_dump(&dump).map_err(|e| format!("Failed to read dump {}: {}", dump.display(), e))?;

    let grid = RosterGrid::from_csv_path(&roster_path).map_err(|e| e.to_string())?;
    let roster = Roster::from_grid(&grid).map_err(|e| e.to_string())?;
    println!("  ✓ Loaded {} roster rows", roster.len());
    for warning in &roster.warnings {
        println!("  ⚠ row {}: {}", warning.row, warning.message);
    }

    let source_file = roster_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| roster_path.display().to_string());

    println!("\n🔄 Reconciling {} against {}...", config.employee_table, store_config.base_url);
    let run = ReconcileJob::new(&config)
        .dry_run(dry_run)
        .run(&store, &text, &roster, &source_file)
        .await
        .map_err(|e| e.to_string())?;
    let report = &run.report;

    println!("  ✓ Dump employees: {}", report.dump.rows);
    println!("  ✓ Roster rows: {}", report.roster.rows);
    println!("  ✓ Matched: {} ({} re-matched)", report.tally.matched, report.tally.rematched);
    println!("  ✓ Active: {}, inactive: {}", report.tally.active, report.tally.inactive);
    if !report.unmatched.is_empty() {
        println!("  ⚠ Unmatched rows: {}", report.unmatched.len());
        for row in report.unmatched.iter().take(10) {
            println!("    - row {}: {} ({})", row.row, row.name, row.reason);
        }
    }

    if let Some(path) = &report_path {
        write_json_file(report, path).map_err(|e| format!("Failed to write report: {}", e))?;
        println!("  ✓ Report written to {}", path.display());
    }

    if dry_run {
        println!("\nℹ Dry run: {} documents not written", run.documents.len());
        return Ok(());
    }

    println!("\n✨ Wrote {} employee documents to {}", report.written, report.collection);
    if !report.succeeded() {
        for failure in &report.failures {
            eprintln!("  ✗ {}: {}", failure.id, failure.reason);
        }
        return Err(format!("{} upsert(s) failed", report.failures.len()));
    }
    Ok(())
}
