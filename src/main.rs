use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use telemetry_server::config::{Config, StoreBackend};
use telemetry_server::store::{InMemoryStore, RecordStore, SqliteStore};
use telemetry_server::{logging, metrics, server};

#[derive(Parser)]
#[command(name = "telemetry_server")]
#[command(about = "Ingestion endpoint for node telemetry")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to a TOML config file (defaults to ./config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to run the server on
    #[arg(short, long)]
    port: Option<u16>,

    /// Record store backend: sqlite, memory or libsql
    #[arg(long)]
    backend: Option<String>,

    /// Database file for the sqlite backend
    #[arg(long)]
    store_path: Option<PathBuf>,
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match config.store.backend {
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(&config.store.path)?),
        StoreBackend::Memory => Arc::new(InMemoryStore::new()),
        #[cfg(feature = "db")]
        StoreBackend::Libsql => Arc::new(telemetry_server::store::LibsqlStore::connect().await?),
        #[cfg(not(feature = "db"))]
        StoreBackend::Libsql => {
            anyhow::bail!("the libsql backend requires building with the `db` feature")
        }
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_cli(cli.port, cli.backend.as_deref(), cli.store_path)?;

    // Initialize logging
    let _log_guard = logging::init_logging(&config.logging)?;

    if config.metrics.enabled {
        metrics::init_metrics(config.metrics.listen_addr()?);
    }

    info!("Initializing {:?} record store...", config.store.backend);
    let store = open_store(&config).await?;
    info!("Record store initialized successfully");

    server::start_server(store, config.bind_addr()?).await?;

    Ok(())
}
