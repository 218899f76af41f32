use crate::cluster::{Cluster, ClusterUrls};
use crate::retry::RetryPolicy;
use crate::rpc::{Commitment, RpcOptions};
use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Settings shared by the CLI and the proxy.
///
/// Configuration priority: CLI args > Environment variables > config file > Defaults
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Cluster to talk to: mainnet-beta, testnet or custom
    #[arg(short, long, env = "SOLX_CLUSTER", value_parser = clap::value_parser!(Cluster))]
    pub cluster: Option<Cluster>,

    /// RPC endpoint used when the cluster is `custom`
    #[arg(long, env = "CUSTOM_RPC_URL")]
    pub custom_url: Option<String>,

    /// Mainnet RPC endpoint override
    #[arg(long, env = "MAINNET_RPC_URL")]
    pub mainnet_url: Option<String>,

    /// Testnet RPC endpoint override
    #[arg(long, env = "TESTNET_RPC_URL")]
    pub testnet_url: Option<String>,

    /// RPC request timeout in milliseconds (1000-60000)
    #[arg(long, env = "RPC_TIMEOUT_MS")]
    pub rpc_timeout_ms: Option<u64>,

    /// Commitment level: processed, confirmed or finalized
    #[arg(long, env = "RPC_COMMITMENT", value_parser = clap::value_parser!(Commitment))]
    pub commitment: Option<Commitment>,

    /// Attempts per block fetch in the proxy (1-10)
    #[arg(long, env = "RPC_RETRIES")]
    pub rpc_retries: Option<u32>,

    /// Base backoff delay in milliseconds, doubled per attempt (10-10000)
    #[arg(long, env = "RETRY_BASE_MS")]
    pub retry_base_ms: Option<u64>,

    /// Don't retry HTTP 429 responses from the node
    #[arg(long, env = "DISABLE_RATE_LIMIT_RETRY")]
    pub disable_rate_limit_retry: bool,

    /// User-Agent sent to the node
    #[arg(long, env = "RPC_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Items fetched concurrently per batch (1-50)
    #[arg(long, env = "BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Base URL of the solx proxy
    #[arg(long, env = "SOLX_API_URL")]
    pub api_url: Option<String>,

    /// Path to SQLite database for the transaction index
    #[arg(long, env = "SQLITE_DB_PATH")]
    pub db_path: Option<String>,

    /// Proxy listen port
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Optional TOML file with cluster and RPC overrides
    #[arg(long, env = "SOLX_CONFIG_FILE")]
    pub config_file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub clusters: ClusterSection,
    pub rpc: RpcSection,
    pub proxy: ProxySection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterSection {
    pub default: Option<String>,
    pub mainnet: Option<String>,
    pub testnet: Option<String>,
    pub custom: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RpcSection {
    pub timeout_ms: Option<u64>,
    pub commitment: Option<String>,
    pub retries: Option<u32>,
    pub retry_base_ms: Option<u64>,
    pub user_agent: Option<String>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxySection {
    pub api_url: Option<String>,
    pub db_path: Option<String>,
    pub port: Option<u16>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid config file")
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&text)
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub cluster: Cluster,
    pub custom_url: String,
    pub urls: ClusterUrls,
    pub rpc: RpcOptions,
    /// Retry policy for individual block fetches in the proxy.
    pub fetch_retry: RetryPolicy,
    pub batch_size: usize,
    pub api_url: String,
    pub db_path: String,
    pub port: u16,
}

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3001";
pub const DEFAULT_DB_PATH: &str = "./solx_index.db";
pub const DEFAULT_PORT: u16 = 3001;

/// Validate that a value is within a given range (inclusive)
pub fn validate_in_range<T>(val: T, min: T, max: T, name: &str) -> Result<T>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if val < min || val > max {
        Err(anyhow!("{name} must be in range [{min}, {max}], got {val}"))
    } else {
        Ok(val)
    }
}

/// Validate URL format: http(s) with a host
pub fn validate_url(raw: &str, name: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(anyhow!("{name} cannot be empty"));
    }
    let parsed = url::Url::parse(raw).map_err(|e| anyhow!("{name} is not a valid URL: {e}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(anyhow!("{name} must start with http:// or https://"));
    }
    if parsed.host_str().is_none() {
        return Err(anyhow!("{name} must include a host"));
    }
    Ok(())
}

impl Config {
    /// Merge CLI/env (already folded together by clap) over the file.
    pub fn resolve(args: ConfigArgs, file: FileConfig) -> Result<Config> {
        let cluster = match args.cluster {
            Some(c) => c,
            None => file
                .clusters
                .default
                .as_deref()
                .map(str::parse)
                .transpose()?
                .unwrap_or(Cluster::Mainnet),
        };

        let urls = ClusterUrls {
            mainnet: args
                .mainnet_url
                .or(file.clusters.mainnet)
                .unwrap_or_else(|| Cluster::Mainnet.default_url().to_string()),
            testnet: args
                .testnet_url
                .or(file.clusters.testnet)
                .unwrap_or_else(|| Cluster::Testnet.default_url().to_string()),
        };
        validate_url(&urls.mainnet, "MAINNET_RPC_URL")?;
        validate_url(&urls.testnet, "TESTNET_RPC_URL")?;

        let custom_url = args
            .custom_url
            .or(file.clusters.custom)
            .unwrap_or_else(|| Cluster::Custom.default_url().to_string());
        if cluster == Cluster::Custom {
            validate_url(&custom_url, "CUSTOM_RPC_URL")?;
        }

        let rpc_timeout_ms = args.rpc_timeout_ms.or(file.rpc.timeout_ms).unwrap_or(8000);
        let rpc_timeout_ms = validate_in_range(rpc_timeout_ms, 1000, 60000, "RPC_TIMEOUT_MS")?;

        let commitment = match args.commitment {
            Some(c) => c,
            None => file
                .rpc
                .commitment
                .as_deref()
                .map(str::parse)
                .transpose()?
                .unwrap_or_default(),
        };

        let rpc_retries = args.rpc_retries.or(file.rpc.retries).unwrap_or(3);
        let rpc_retries = validate_in_range(rpc_retries, 1, 10, "RPC_RETRIES")?;

        let retry_base_ms = args.retry_base_ms.or(file.rpc.retry_base_ms).unwrap_or(500);
        let retry_base_ms = validate_in_range(retry_base_ms, 10, 10000, "RETRY_BASE_MS")?;

        let batch_size = args.batch_size.or(file.rpc.batch_size).unwrap_or(5);
        let batch_size = validate_in_range(batch_size, 1, 50, "BATCH_SIZE")?;

        let defaults = RpcOptions::default();
        let rpc = RpcOptions {
            commitment,
            timeout: Duration::from_millis(rpc_timeout_ms),
            retry_on_rate_limit: !args.disable_rate_limit_retry,
            rate_limit_retry: defaults.rate_limit_retry,
            user_agent: args
                .user_agent
                .or(file.rpc.user_agent)
                .unwrap_or(defaults.user_agent),
        };

        let api_url = args
            .api_url
            .or(file.proxy.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        validate_url(&api_url, "SOLX_API_URL")?;

        Ok(Config {
            cluster,
            custom_url,
            urls,
            rpc,
            fetch_retry: RetryPolicy::new(rpc_retries, Duration::from_millis(retry_base_ms)),
            batch_size,
            api_url,
            db_path: args
                .db_path
                .or(file.proxy.db_path)
                .unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            port: args.port.or(file.proxy.port).unwrap_or(DEFAULT_PORT),
        })
    }

    pub fn url(&self) -> String {
        self.urls.url_for(self.cluster, &self.custom_url)
    }

    pub fn log_summary(&self) {
        log::info!("solx configuration:");
        log::info!("  Cluster: {} ({})", self.cluster, self.url());
        log::info!("  Commitment: {}", self.rpc.commitment);
        log::info!("  RPC Timeout: {}ms", self.rpc.timeout.as_millis());
        log::info!(
            "  Retries: {} (base {}ms)",
            self.fetch_retry.max_attempts,
            self.fetch_retry.base_delay.as_millis()
        );
        log::info!("  Rate-limit retry: {}", self.rpc.retry_on_rate_limit);
        log::info!("  Batch size: {}", self.batch_size);
        log::info!("  API: {}", self.api_url);
    }
}

/// Load configuration from parsed args, reading the optional TOML file.
pub fn load(args: ConfigArgs) -> Result<Config> {
    let file = match args.config_file.as_deref() {
        Some(path) => FileConfig::read(path)?,
        None => FileConfig::default(),
    };
    Config::resolve(args, file)
}
