// Bank Transfers - Web Server
// Upload endpoint and JSON query API with Axum

use anyhow::{bail, Context, Result};
use bank_transfers::web::{router, AppState};
use bank_transfers::{Config, SqliteStore};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "transfers-server")]
#[command(about = "Serve bank-transfer uploads and queries over HTTP", long_about = None)]
struct Args {
    /// SQLite database file
    #[arg(long, env = "TRANSFERS_DB", default_value = "transfers.db")]
    db: PathBuf,

    /// Directory uploads are spooled to before ingestion
    #[arg(long, env = "TRANSFERS_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Static assets served at /
    #[arg(long, env = "TRANSFERS_STATIC_DIR", default_value = "public")]
    static_dir: PathBuf,

    /// Rows per batch write
    #[arg(long, env = "TRANSFERS_BATCH_SIZE", default_value_t = bank_transfers::config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            database_path: self.db,
            upload_dir: self.upload_dir,
            static_dir: self.static_dir,
            batch_size: self.batch_size,
            ..Config::default()
        }
        .with_port(self.port)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bank_transfers=info,tower_http=info".into()),
        )
        .init();

    let config = Args::parse().into_config();
    if let Err(e) = config.validate() {
        bail!("Invalid configuration: {}", e);
    }

    // Schema must be ready before the listener accepts anything
    let store = SqliteStore::open(&config.database_path).with_context(|| {
        format!("Failed to initialize database at {}", config.database_path.display())
    })?;
    info!(db = %config.database_path.display(), "database ready");

    std::fs::create_dir_all(&config.upload_dir).with_context(|| {
        format!("Failed to create upload directory {}", config.upload_dir.display())
    })?;

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(Arc::new(store), config);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!(addr = %bind_addr, "server running");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
