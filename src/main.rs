use anyhow::{bail, Context, Result};
use bank_transfers::{ingest, Config, IngestOptions, SqliteStore, TransferSource};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bank-transfers")]
#[command(about = "Import bank-transfer CSV exports into SQLite", long_about = None)]
struct Args {
    /// SQLite database file
    #[arg(long, env = "TRANSFERS_DB", default_value = "transfers.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the schema if it does not exist yet
    Init,

    /// Import a CSV export (the file is left in place)
    Import {
        csv: PathBuf,

        /// Rows per batch write
        #[arg(long, env = "TRANSFERS_BATCH_SIZE", default_value_t = bank_transfers::config::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Print the number of stored transfers
    Count,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,bank_transfers=info".into()),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Init => run_init(args.db),
        Command::Import { csv, batch_size } => run_import(args.db, csv, batch_size),
        Command::Count => run_count(args.db),
    }
}

fn open_store(db: &Path) -> Result<SqliteStore> {
    SqliteStore::open(db).with_context(|| format!("Failed to open database {}", db.display()))
}

fn run_init(db: PathBuf) -> Result<()> {
    open_store(&db)?;
    println!("✓ Schema ready in {}", db.display());
    Ok(())
}

fn run_import(db: PathBuf, csv: PathBuf, batch_size: usize) -> Result<()> {
    let config = Config {
        database_path: db,
        batch_size,
        ..Config::default()
    };
    if let Err(e) = config.validate() {
        bail!("Invalid configuration: {}", e);
    }

    println!("📂 Loading {}...", csv.display());
    let content = std::fs::read_to_string(&csv)
        .with_context(|| format!("Failed to read CSV file {}", csv.display()))?;

    let store = open_store(&config.database_path)?;

    println!("💾 Inserting transfers in batches of {}...", config.batch_size);
    let report = ingest(&store, &content, IngestOptions::from(&config))
        .with_context(|| format!("Failed to ingest {}", csv.display()))?;

    println!("✓ Inserted: {} transfers", report.inserted);
    println!("✓ Skipped rows: {}", report.skipped);
    for skipped in &report.skipped_samples {
        println!("   line {}: {}", skipped.line, skipped.reason);
    }

    let count = store.count()?;
    println!("✓ Database contains {} transfers", count);

    if let Some(failure) = report.failed_batch {
        bail!(
            "Batch {} failed after {} rows were committed ({} rows not committed): {}",
            failure.index,
            report.inserted,
            failure.not_committed,
            failure.error
        );
    }

    Ok(())
}

fn run_count(db: PathBuf) -> Result<()> {
    let store = open_store(&db)?;
    println!("{}", store.count()?);
    Ok(())
}
