//! solx - Solana explorer data layer
//!
//! Fetches, caches and retries everything a block explorer shows: epoch and
//! validator overviews, accounts and their history, transactions, tokens,
//! plus a small proxy that serves recent blocks and a rolling transaction
//! index.
//!
//! ## Architecture
//!
//! - **Resources**: one [`resource::Resource`] per payload type, each a
//!   two-level cache (endpoint URL, then key) driven through
//!   `Idle -> Fetching -> Fetched | FetchFailed`
//! - **Cluster**: [`cluster::ClusterContext`] tracks the selected network and
//!   runs the connection handshake
//! - **Proxy**: the [`api`] module aggregates node calls server-side and keeps
//!   the SQLite-backed [`store::TxIndex`]
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin solx -- --cluster testnet epoch
//! cargo run --bin solx-proxy --features proxy
//! ```

// Core modules (available with any feature set)
pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod retry;
pub mod types;
pub mod util_text;

// Node access and the per-resource services built on it
pub mod cluster;
pub mod resource;
pub mod resources;
pub mod rpc;

// Client side of the proxy routes
pub mod api_client;
pub mod explorer;

// Server side: SQLite index and route aggregation
#[cfg(feature = "native")]
pub mod api;
#[cfg(feature = "native")]
pub mod store;

#[cfg(test)]
mod testing;

pub use cache::{CacheEntry, FetchStatus};
pub use cluster::{Cluster, ClusterContext};
pub use error::{ErrorKind, FetchError, FetchResult};
pub use explorer::Explorer;
pub use resource::{FetchScope, Resource};
pub use rpc::{ChainRpc, HttpConnector, RpcClient};
