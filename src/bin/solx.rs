//! Command-line client for the solx data layer
//!
//! Connects to a cluster, runs one fetch and prints the resulting cache entry
//! as JSON.
//!
//! ## Usage
//! ```bash
//! cargo run --bin solx -- --cluster testnet epoch
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;

use solx::{
    api_client::ApiClient,
    cache::{CacheEntry, FetchStatus},
    cluster::{ClusterContext, ClusterStatus},
    config::{load, ConfigArgs},
    resource::LogReporter,
    resources::{address_history, latest_transactions},
    rpc::HttpConnector,
    types::LargestAccountsFilter,
    Explorer,
};

/// solx - Solana explorer data from the command line
///
/// Configuration priority: CLI args > Environment variables > config file > Defaults
#[derive(Parser, Debug)]
#[command(name = "solx")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Solana explorer data layer", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Print the resolved configuration to the log before running
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and print the cluster handshake
    Cluster,
    /// Current epoch progress
    Epoch,
    /// Current and delinquent validators by stake
    Validators,
    /// Recent blocks from the proxy
    Blocks {
        /// Newest slot of the window (defaults to the tip)
        #[arg(long)]
        before: Option<u64>,
    },
    /// Page of the proxy's transaction index
    Txs {
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long, default_value_t = latest_transactions::DEFAULT_DOCS)]
        docs: usize,
        /// Ask the proxy to refresh its index first
        #[arg(long)]
        refresh: bool,
    },
    /// Account overview
    Account { address: String },
    /// Signature history of an address
    History {
        address: String,
        #[arg(long, default_value_t = address_history::DEFAULT_PAGE)]
        limit: usize,
        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Transaction detail
    Tx { signature: String },
    /// SPL token holdings of an owner
    Tokens { owner: String },
    /// Mint supply, decimals and authorities
    Mint { address: String },
    /// Largest accounts, optionally filtered (circulating, nonCirculating)
    Top {
        #[arg(long, value_parser = clap::value_parser!(LargestAccountsFilter))]
        filter: Option<LargestAccountsFilter>,
    },
}

fn print_entry<T: Serialize>(entry: Option<CacheEntry<T>>) -> Result<()> {
    let entry = entry.context("request was superseded")?;
    println!("{}", serde_json::to_string_pretty(&entry)?);
    if entry.status == FetchStatus::FetchFailed {
        bail!(entry.error.unwrap_or_else(|| "fetch failed".into()));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (safe to ignore if not found)
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let cfg = load(cli.config).context("Failed to load configuration")?;
    if cli.verbose {
        cfg.log_summary();
    }

    let reporter = Arc::new(LogReporter);
    let ctx = ClusterContext::new(
        cfg.cluster,
        cfg.custom_url.clone(),
        cfg.urls.clone(),
        Arc::new(HttpConnector::new(cfg.rpc.clone())),
        reporter.clone(),
    );
    let explorer = Explorer::new(ctx, ApiClient::new(&cfg.api_url, cfg.rpc.timeout), reporter);

    let state = explorer.connect().await;
    if let Command::Cluster = cli.command {
        println!("{}", serde_json::to_string_pretty(&state)?);
        if state.status != ClusterStatus::Connected {
            bail!(state.error.unwrap_or_else(|| "connection failed".into()));
        }
        return Ok(());
    }
    if state.status != ClusterStatus::Connected {
        log::warn!(
            "cluster handshake failed: {}",
            state.error.as_deref().unwrap_or("unknown error")
        );
    }

    match cli.command {
        Command::Cluster => Ok(()),
        Command::Epoch => print_entry(explorer.epoch(true).await),
        Command::Validators => print_entry(explorer.validators(true).await),
        Command::Blocks { before } => print_entry(explorer.latest_blocks(before).await),
        Command::Txs { page, docs, refresh } => {
            if refresh {
                let msg = explorer.refresh_transactions(docs).await?;
                log::info!("{}", msg.message);
            }
            print_entry(explorer.latest_transactions(page, docs).await)
        }
        Command::Account { address } => print_entry(explorer.account(&address, true).await),
        Command::History { address, limit, pages } => {
            let mut entry = explorer.history(&address, limit).await;
            for _ in 1..pages {
                if entry.as_ref().and_then(|e| e.data.as_ref()).map_or(true, |h| h.found_oldest) {
                    break;
                }
                entry = explorer.history_more(&address, limit).await;
            }
            print_entry(entry)
        }
        Command::Tx { signature } => print_entry(explorer.transaction(&signature, true).await),
        Command::Tokens { owner } => print_entry(explorer.tokens(&owner, true).await),
        Command::Mint { address } => print_entry(explorer.mint(&address, true).await),
        Command::Top { filter } => print_entry(explorer.top_accounts(filter, true).await),
    }
}
