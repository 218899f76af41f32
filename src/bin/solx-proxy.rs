//! Backend proxy server for the solx explorer
//!
//! Aggregates node calls server-side so the client only makes one request per
//! view, and keeps a rolling SQLite index of recent transactions.
//!
//! ## Endpoints
//! - GET /health - Health check
//! - GET /api/latest_blocks?block=N - Window of 25 recent blocks
//! - GET /api/latest_transactions?page&docs&name&url - Page the transaction index
//! - POST /api/latest_transactions?name&url - Refresh the transaction index
//!
//! ## Usage
//! ```bash
//! cargo run --bin solx-proxy --features proxy
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use solx::{
    api::{
        routes::{router, AppState},
        IndexSettings,
    },
    config::{load, ConfigArgs},
    rpc::HttpConnector,
    store::TxIndex,
};

/// solx proxy - recent blocks and a rolling transaction index over HTTP
#[derive(Parser, Debug)]
#[command(name = "solx-proxy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct ProxyArgs {
    #[command(flatten)]
    config: ConfigArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = ProxyArgs::parse();
    let cfg = load(args.config).context("Failed to load configuration")?;

    log::info!("solx proxy {}", env!("CARGO_PKG_VERSION"));
    cfg.log_summary();
    log::info!("  Index: {}", cfg.db_path);
    log::info!("  Port: {}", cfg.port);

    let index = TxIndex::open(&cfg.db_path)
        .with_context(|| format!("opening transaction index at {}", cfg.db_path))?;

    let state = AppState {
        connector: Arc::new(HttpConnector::new(cfg.rpc.clone())),
        urls: cfg.urls.clone(),
        default_cluster: cfg.cluster,
        index,
        batch_size: cfg.batch_size,
        retry: cfg.fetch_retry,
        index_settings: IndexSettings {
            batch_size: cfg.batch_size,
            retry: cfg.fetch_retry,
            ..IndexSettings::default()
        },
    };

    let app = router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("shutting down");
        })
        .await?;

    Ok(())
}
