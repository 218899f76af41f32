//! Active network selection and the connection handshake.
//!
//! `Connecting -> Connected | Failure`. Connecting runs four node calls at
//! once; `cluster_info` is only populated once all four succeed.

use crate::error::{FetchError, FetchResult};
use crate::resource::{should_report, ErrorReporter, FetchScope, ReportContext};
use crate::rpc::{ChainRpc, Connector};
use crate::types::{EpochInfo, EpochSchedule};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cluster {
    #[serde(rename = "mainnet-beta")]
    Mainnet,
    Testnet,
    Custom,
}

impl Cluster {
    pub const ALL: [Cluster; 3] = [Cluster::Mainnet, Cluster::Testnet, Cluster::Custom];

    pub fn default_url(&self) -> &'static str {
        match self {
            Cluster::Mainnet => "https://api.mainnet-beta.solana.com",
            Cluster::Testnet => "https://api.testnet.solana.com",
            Cluster::Custom => "http://localhost:8899",
        }
    }

    /// Network name used to partition the transaction index.
    pub fn name(&self) -> &'static str {
        match self {
            Cluster::Mainnet => "mainnet-beta",
            Cluster::Testnet => "testnet",
            Cluster::Custom => "custom",
        }
    }
}

impl std::str::FromStr for Cluster {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mainnet" | "mainnet-beta" => Ok(Cluster::Mainnet),
            "testnet" => Ok(Cluster::Testnet),
            "custom" => Ok(Cluster::Custom),
            _ => Err(anyhow!(
                "Invalid cluster '{s}'. Valid options: mainnet-beta, testnet, custom"
            )),
        }
    }
}

impl std::fmt::Display for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved endpoint per built-in cluster (after env/file overrides).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterUrls {
    pub mainnet: String,
    pub testnet: String,
}

impl Default for ClusterUrls {
    fn default() -> Self {
        Self {
            mainnet: Cluster::Mainnet.default_url().to_string(),
            testnet: Cluster::Testnet.default_url().to_string(),
        }
    }
}

impl ClusterUrls {
    pub fn url_for(&self, cluster: Cluster, custom_url: &str) -> String {
        match cluster {
            Cluster::Mainnet => self.mainnet.clone(),
            Cluster::Testnet => self.testnet.clone(),
            Cluster::Custom => custom_url.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ClusterStatus {
    Connecting,
    Connected,
    Failure,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    pub first_available_block: u64,
    pub epoch_schedule: EpochSchedule,
    pub epoch_info: EpochInfo,
    pub genesis_hash: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterState {
    pub cluster: Cluster,
    pub custom_url: String,
    pub status: ClusterStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_info: Option<ClusterInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a switch changed, so the owner of the resource caches can decide
/// what to clear.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Switched {
    pub from: FetchScope,
    pub to: FetchScope,
}

/// Fetch the handshake bundle concurrently; any failure fails the bundle.
pub async fn fetch_cluster_info(rpc: &dyn ChainRpc) -> FetchResult<ClusterInfo> {
    let (first_available_block, epoch_schedule, epoch_info, genesis_hash) = tokio::try_join!(
        rpc.get_first_available_block(),
        rpc.get_epoch_schedule(),
        rpc.get_epoch_info(),
        rpc.get_genesis_hash(),
    )?;
    Ok(ClusterInfo {
        first_available_block,
        epoch_schedule,
        epoch_info,
        genesis_hash,
    })
}

pub struct ClusterContext {
    urls: ClusterUrls,
    connector: Arc<dyn Connector>,
    reporter: Arc<dyn ErrorReporter>,
    state: Mutex<ClusterState>,
    generation: AtomicU64,
}

impl ClusterContext {
    pub fn new(
        cluster: Cluster,
        custom_url: impl Into<String>,
        urls: ClusterUrls,
        connector: Arc<dyn Connector>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            urls,
            connector,
            reporter,
            state: Mutex::new(ClusterState {
                cluster,
                custom_url: custom_url.into(),
                status: ClusterStatus::Connecting,
                cluster_info: None,
                error: None,
            }),
            generation: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> ClusterState {
        self.lock().clone()
    }

    pub fn url(&self) -> String {
        let s = self.lock();
        self.urls.url_for(s.cluster, &s.custom_url)
    }

    pub fn scope(&self) -> FetchScope {
        let s = self.lock();
        FetchScope::new(self.urls.url_for(s.cluster, &s.custom_url), s.cluster)
    }

    pub fn rpc(&self) -> Arc<dyn ChainRpc> {
        self.connector.connect(&self.url())
    }

    /// (Re)run the handshake against the current cluster.
    pub async fn connect(&self) -> ClusterState {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let scope = {
            let mut s = self.lock();
            s.status = ClusterStatus::Connecting;
            s.cluster_info = None;
            s.error = None;
            FetchScope::new(self.urls.url_for(s.cluster, &s.custom_url), s.cluster)
        };
        log::info!("[cluster] connecting to {} ({})", scope.cluster, scope.url);

        let result = match validate_endpoint(&scope.url) {
            Ok(()) => {
                let rpc = self.connector.connect(&scope.url);
                fetch_cluster_info(rpc.as_ref()).await
            }
            Err(e) => Err(e),
        };

        let mut s = self.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            log::debug!("[cluster] stale handshake for {} ignored", scope.url);
            return s.clone();
        }
        match result {
            Ok(info) => {
                log::info!(
                    "[cluster] connected to {} (epoch {}, genesis {})",
                    scope.cluster,
                    info.epoch_info.epoch,
                    crate::util_text::short_key(&info.genesis_hash)
                );
                s.status = ClusterStatus::Connected;
                s.cluster_info = Some(info);
            }
            Err(e) => {
                log::warn!("[cluster] failed to connect to {}: {e}", scope.url);
                if should_report(scope.cluster, &e) {
                    self.reporter.report(
                        &ReportContext {
                            resource: "cluster",
                            key: "connect",
                            url: &scope.url,
                            cluster: scope.cluster,
                        },
                        &e,
                    );
                }
                s.status = ClusterStatus::Failure;
                s.error = Some(e.to_string());
            }
        }
        s.clone()
    }

    /// Select a different network (or a different custom URL) and connect.
    pub async fn switch(&self, cluster: Cluster, custom_url: Option<String>) -> (Switched, ClusterState) {
        let switched = {
            let mut s = self.lock();
            let from = FetchScope::new(self.urls.url_for(s.cluster, &s.custom_url), s.cluster);
            s.cluster = cluster;
            if let Some(u) = custom_url {
                s.custom_url = u;
            }
            let to = FetchScope::new(self.urls.url_for(s.cluster, &s.custom_url), s.cluster);
            Switched { from, to }
        };
        let state = self.connect().await;
        (switched, state)
    }
}

fn validate_endpoint(raw: &str) -> FetchResult<()> {
    let parsed = url::Url::parse(raw).map_err(|e| FetchError::invalid(format!("invalid endpoint {raw}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(FetchError::invalid(format!("unsupported endpoint scheme '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockConnector, MockRpc, Recorder};
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn cluster_names_round_trip() {
        for c in Cluster::ALL {
            assert_eq!(c.to_string().parse::<Cluster>().unwrap(), c);
        }
        assert_eq!("mainnet".parse::<Cluster>().unwrap(), Cluster::Mainnet);
        assert!("devnet-2".parse::<Cluster>().is_err());
    }

    #[test]
    fn custom_cluster_uses_custom_url() {
        let urls = ClusterUrls::default();
        assert_eq!(urls.url_for(Cluster::Custom, "http://10.0.0.2:8899"), "http://10.0.0.2:8899");
        assert_eq!(urls.url_for(Cluster::Mainnet, "ignored"), Cluster::Mainnet.default_url());
    }

    #[test]
    fn endpoint_validation() {
        assert!(validate_endpoint("https://api.testnet.solana.com").is_ok());
        assert!(validate_endpoint("ws://localhost:8900").is_err());
        assert!(validate_endpoint("not a url").is_err());
    }


    fn context(
        cluster: Cluster,
        custom_url: &str,
        nodes: Vec<(String, MockRpc)>,
        reporter: Arc<Recorder>,
    ) -> ClusterContext {
        let nodes: HashMap<String, Arc<MockRpc>> = nodes.into_iter().map(|(u, n)| (u, Arc::new(n))).collect();
        ClusterContext::new(
            cluster,
            custom_url,
            ClusterUrls::default(),
            Arc::new(MockConnector { nodes }),
            reporter,
        )
    }

    fn without_schedule() -> MockRpc {
        let mut node = MockRpc::default().with_handshake();
        node.epoch_schedule = None;
        node
    }

    #[tokio::test]
    async fn failed_handshake_leaves_no_cluster_info() {
        let rec = Arc::new(Recorder::default());
        let urls = ClusterUrls::default();
        let ctx = context(Cluster::Mainnet, "", vec![(urls.mainnet.clone(), without_schedule())], rec.clone());

        let state = ctx.connect().await;
        assert_eq!(state.status, ClusterStatus::Failure);
        assert!(state.cluster_info.is_none());
        assert!(state.error.as_deref().is_some_and(|e| e.contains("epoch schedule")));
        assert_eq!(ctx.state(), state);
        assert_eq!(rec.reports().len(), 1);
        assert!(rec.reports()[0].starts_with("cluster:connect:"));
    }

    #[tokio::test]
    async fn custom_handshake_failure_is_not_reported() {
        let rec = Arc::new(Recorder::default());
        let custom = "http://localhost:8899";
        let ctx = context(Cluster::Custom, custom, vec![(custom.to_string(), without_schedule())], rec.clone());

        let state = ctx.connect().await;
        assert_eq!(state.status, ClusterStatus::Failure);
        assert!(state.cluster_info.is_none());
        assert!(rec.reports().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_handshake_is_dropped() {
        let urls = ClusterUrls::default();
        let mut slow = MockRpc::default().with_handshake();
        slow.genesis_hash = Some("4uhcVJyU9pJkvQyS88uRDiswHXSCkY3zQawwpjk2NsNY".into());
        slow.latency = Duration::from_secs(60);
        let fast = MockRpc::default().with_handshake();
        let ctx = context(
            Cluster::Testnet,
            "",
            vec![(urls.testnet.clone(), slow), (urls.mainnet.clone(), fast)],
            Arc::new(Recorder::default()),
        );

        let (stale, (switched, fresh)) = tokio::join!(ctx.connect(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            ctx.switch(Cluster::Mainnet, None).await
        });

        assert_eq!(switched.from.cluster, Cluster::Testnet);
        assert_eq!(switched.to.cluster, Cluster::Mainnet);
        assert_eq!(fresh.status, ClusterStatus::Connected);
        // the slow testnet answer arrived last but did not land
        assert_eq!(stale.cluster, Cluster::Mainnet);
        let info = ctx.state().cluster_info.unwrap();
        assert_eq!(info.genesis_hash, "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdpKuc147dw2N9d");
    }
}
