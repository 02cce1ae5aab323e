use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use places_core::cancel::cancellation;
use places_core::config::{BulkConfig, StoreConfig, DEFAULT_INDEX};
use places_core::descriptor::IndexDescriptor;
use places_core::indexing::{Indexer, Outcome};
use places_core::source::read_places;
use places_core::store::elastic::ElasticStore;
use places_core::store::DocumentStore;
use places_core::ConfigError;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Load a places dataset into the document store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-create the index and bulk load a tab-separated places file into it
    Build {
        /// Input TSV file (header row, then id, name, address, phone, longitude, latitude)
        #[arg(long)]
        input: String,
        /// Document store base URL
        #[arg(long, env = "PLACES_STORE_URL", default_value = "http://localhost:9200")]
        store_url: String,
        /// Target index name
        #[arg(long, env = "PLACES_INDEX", default_value = DEFAULT_INDEX)]
        index: String,
        /// Number of concurrent bulk workers (defaults to available CPUs)
        #[arg(long)]
        workers: Option<usize>,
        /// Flush a worker's batch once its payload reaches this many bytes
        #[arg(long)]
        flush_bytes: Option<usize>,
        /// Flush a worker's batch at least this often
        #[arg(long)]
        flush_interval_secs: Option<u64>,
        /// Per-request timeout against the store
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, store_url, index, workers, flush_bytes, flush_interval_secs, timeout_secs } => {
            let store_cfg = StoreConfig::new(&store_url, &index, Duration::from_secs(timeout_secs))?;
            let bulk_cfg = BulkConfig::from_overrides(workers, flush_bytes, flush_interval_secs)?;
            build_index(&input, &store_cfg, bulk_cfg).await
        }
    }
}

async fn build_index(input: &str, store_cfg: &StoreConfig, bulk_cfg: BulkConfig) -> Result<()> {
    let records = read_places(input).with_context(|| format!("reading {input}"))?;

    let store = ElasticStore::new(store_cfg)?;
    store.ping().await.map_err(ConfigError::Unreachable)?;
    let store: Arc<dyn DocumentStore> = Arc::new(store);

    let (handle, token) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            handle.cancel();
        }
    });

    let descriptor = IndexDescriptor::places(store_cfg.index.clone());
    let report = Indexer::new(store, bulk_cfg).run(&descriptor, &records, token).await?;

    let finished_at = time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_default();
    tracing::info!(index = %report.index, finished_at = %finished_at, outcome = ?report.outcome, "index build finished");
    match report.outcome {
        Outcome::Completed => Ok(()),
        Outcome::Degraded => bail!("{report}"),
        Outcome::Cancelled => bail!("{report}"),
    }
}
