use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use clap::Parser;
use places_core::auth::TokenAuthority;
use places_core::cancel::cancellation;
use places_core::config::{BulkConfig, StoreConfig, DEFAULT_INDEX};
use places_core::descriptor::IndexDescriptor;
use places_core::query::{QueryService, DEFAULT_PAGE_SIZE, DEFAULT_RECOMMEND_LIMIT};
use places_core::store::elastic::ElasticStore;
use places_core::store::memory::MemoryStore;
use places_core::store::DocumentStore;
use places_core::ConfigError;
use server::{build_app, spawn_startup_indexing, AppState};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

/// How long shutdown waits for a cancelled start-up indexing run to report.
const INDEXING_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
struct Args {
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8888)]
    port: u16,
    /// Document store base URL
    #[arg(long, env = "PLACES_STORE_URL", default_value = "http://localhost:9200")]
    store_url: String,
    /// Keep documents in process instead of talking to a store (local runs)
    #[arg(long, default_value_t = false)]
    in_memory: bool,
    /// Index to serve
    #[arg(long, env = "PLACES_INDEX", default_value = DEFAULT_INDEX)]
    index: String,
    /// HMAC key for bearer tokens
    #[arg(long, env = "PLACES_JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,
    /// Places per listing page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u64,
    /// Places per recommendation
    #[arg(long, default_value_t = DEFAULT_RECOMMEND_LIMIT)]
    recommend_limit: u64,
    /// TSV file to (re)index in the background at start-up
    #[arg(long)]
    data: Option<String>,
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
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    if args.page_size == 0 {
        return Err(ConfigError::InvalidSetting { name: "page_size", reason: "must be at least 1".into() }.into());
    }
    let descriptor = IndexDescriptor::places(args.index.clone());
    descriptor.validate()?;

    let store: Arc<dyn DocumentStore> = if args.in_memory {
        Arc::new(MemoryStore::new())
    } else {
        let cfg = StoreConfig::new(&args.store_url, &args.index, Duration::from_secs(args.timeout_secs))?;
        let store = ElasticStore::new(&cfg)?;
        store.ping().await.map_err(ConfigError::Unreachable)?;
        Arc::new(store)
    };
    let auth = TokenAuthority::new(args.jwt_secret.as_bytes())?;

    let (cancel, token) = cancellation();
    let indexing = match args.data.clone() {
        Some(path) => {
            let bulk = BulkConfig::from_overrides(args.workers, args.flush_bytes, args.flush_interval_secs)?;
            Some(spawn_startup_indexing(store.clone(), descriptor.clone(), path, bulk, token))
        }
        None => None,
    };

    let queries = QueryService::new(store, &descriptor)
        .with_page_size(args.page_size)
        .with_recommend_limit(args.recommend_limit);
    let app: Router = build_app(AppState { queries, auth: Arc::new(auth) });

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, index = %descriptor.name, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
            cancel.cancel();
        })
        .await?;

    if let Some(handle) = indexing {
        match tokio::time::timeout(INDEXING_DRAIN_TIMEOUT, handle).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "start-up indexing task panicked"),
            Err(_) => tracing::warn!(timeout = ?INDEXING_DRAIN_TIMEOUT, "start-up indexing did not stop in time"),
        }
    }
    Ok(())
}
