//! FarmChain gateway daemon.
//!
//! Fronts the external product registry with a read-through cache: plain
//! reads prefer the cache, `POST /api/products/sync/{id}` forces a ledger
//! refresh, and a background listener mirrors creation notifications as they
//! arrive. Runs without a cache at all (`--no-cache`) in registry-only mode.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use farmchain_gateway::cache::{CacheStore, JsonFileCache};
use farmchain_gateway::http::{router, AppState};
use farmchain_gateway::ledger::{HttpLedgerClient, LedgerClient};
use farmchain_gateway::listener::EventListener;
use farmchain_gateway::reconcile::ReconcileService;

#[derive(Parser)]
#[command(name = "farmchain-gateway", about = "FarmChain product registry gateway")]
struct Cli {
    /// HTTP port to listen on.
    #[arg(long, default_value_t = 4000)]
    port: u16,

    /// Base HTTP URL of the registry node.
    #[arg(long, default_value = "http://localhost:8545")]
    ledger_url: String,

    /// WebSocket URL for creation notifications
    /// (derived from --ledger-url when omitted).
    #[arg(long)]
    ledger_ws_url: Option<String>,

    /// Cache file path (default: <cache dir>/farmchain/products.json).
    #[arg(long)]
    cache_file: Option<PathBuf>,

    /// Run without a cache: every read goes straight to the registry.
    #[arg(long)]
    no_cache: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let ledger: Arc<dyn LedgerClient> = Arc::new(HttpLedgerClient::new(
        &cli.ledger_url,
        cli.ledger_ws_url.as_deref(),
    ));

    let cache: Option<Arc<dyn CacheStore>> = if cli.no_cache {
        info!("cache disabled, running registry-only");
        None
    } else {
        let path = cli.cache_file.clone().unwrap_or_else(JsonFileCache::default_path);
        match JsonFileCache::open(&path) {
            Ok(store) => {
                info!("cache open at {}", path.display());
                Some(Arc::new(store))
            }
            Err(e) => {
                warn!("cache unavailable ({e}), running registry-only");
                None
            }
        }
    };

    let listener = match &cache {
        Some(cache) => match EventListener::spawn(ledger.clone(), cache.clone()).await {
            Ok(listener) => Some(listener),
            Err(e) => {
                warn!("creation listener unavailable: {e}");
                None
            }
        },
        None => None,
    };

    let state = AppState {
        service: Arc::new(ReconcileService::new(ledger, cache.clone())),
        cache_enabled: cache.is_some(),
    };
    let app = router(state);

    let addr = format!("0.0.0.0:{}", cli.port);
    let tcp = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    info!("gateway listening on {addr}, registry at {}", cli.ledger_url);

    axum::serve(tcp, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .expect("Server failed");

    if let Some(listener) = listener {
        listener.shutdown().await;
    }
    info!("gateway stopped");
}
