//! Direct JSON-RPC client for the cluster node.
//!
//! Everything above this module talks to [`ChainRpc`]; [`RpcClient`] is the
//! reqwest implementation and tests swap in their own.

use crate::error::{FetchError, FetchResult};
use crate::retry::{with_retry_if, RetryPolicy};
use crate::types::{
    Account, ConfirmedBlock, EpochInfo, EpochSchedule, KeyedAccount, LargestAccount,
    LargestAccountsFilter, ParsedAccount, ParsedTransaction, ProgramAccountsFilter, SignatureInfo,
    SignatureStatus, VoteAccounts,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl std::str::FromStr for Commitment {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            _ => Err(anyhow::anyhow!(
                "Invalid commitment '{s}'. Valid options: processed, confirmed, finalized"
            )),
        }
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn get_block_height(&self) -> FetchResult<u64>;
    /// Confirmed slots in `[start, end]`.
    async fn get_blocks(&self, start: u64, end: u64) -> FetchResult<Vec<u64>>;
    async fn get_block(&self, slot: u64) -> FetchResult<ConfirmedBlock>;
    async fn get_block_signatures(&self, slot: u64) -> FetchResult<Vec<String>>;
    async fn get_parsed_transaction(&self, signature: &str) -> FetchResult<Option<ParsedTransaction>>;
    async fn get_signature_status(&self, signature: &str) -> FetchResult<Option<SignatureStatus>>;
    async fn get_vote_accounts(&self) -> FetchResult<VoteAccounts>;
    async fn get_epoch_info(&self) -> FetchResult<EpochInfo>;
    async fn get_epoch_schedule(&self) -> FetchResult<EpochSchedule>;
    async fn get_genesis_hash(&self) -> FetchResult<String>;
    async fn get_first_available_block(&self) -> FetchResult<u64>;
    async fn get_account_info(&self, address: &str) -> FetchResult<Option<Account>>;
    async fn get_parsed_account_info(&self, address: &str) -> FetchResult<Option<ParsedAccount>>;
    async fn get_program_accounts(
        &self,
        program: &str,
        filters: &[ProgramAccountsFilter],
    ) -> FetchResult<Vec<KeyedAccount>>;
    async fn get_largest_accounts(
        &self,
        filter: Option<LargestAccountsFilter>,
    ) -> FetchResult<Vec<LargestAccount>>;
    async fn get_signatures_for_address(
        &self,
        address: &str,
        before: Option<&str>,
        limit: usize,
    ) -> FetchResult<Vec<SignatureInfo>>;
}

/// Builds a [`ChainRpc`] for an endpoint URL.
pub trait Connector: Send + Sync {
    fn connect(&self, url: &str) -> Arc<dyn ChainRpc>;
}

#[derive(Clone, Debug)]
pub struct RpcOptions {
    pub commitment: Commitment,
    pub timeout: Duration,
    pub retry_on_rate_limit: bool,
    pub rate_limit_retry: RetryPolicy,
    pub user_agent: String,
}

impl Default for RpcOptions {
    fn default() -> Self {
        Self {
            commitment: Commitment::Confirmed,
            timeout: Duration::from_millis(8000),
            retry_on_rate_limit: true,
            rate_limit_retry: RetryPolicy::new(5, Duration::from_millis(500)),
            user_agent: format!("solx/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

static HTTP: OnceLock<reqwest::Client> = OnceLock::new();

pub(crate) fn http_client() -> &'static reqwest::Client {
    HTTP.get_or_init(|| {
        reqwest::Client::builder()
            .pool_max_idle_per_host(8)
            .tcp_nodelay(true)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

#[derive(Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Clone, Debug)]
pub struct RpcClient {
    url: String,
    opts: RpcOptions,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, opts: RpcOptions) -> Self {
        Self {
            url: url.into(),
            opts,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn commitment(&self) -> Value {
        json!({ "commitment": self.opts.commitment.as_str() })
    }

    async fn post_once(&self, body: &Value) -> FetchResult<Value> {
        let res = http_client()
            .post(&self.url)
            .header(reqwest::header::USER_AGENT, &self.opts.user_agent)
            .json(body)
            .timeout(self.opts.timeout)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(FetchError::Http(res.status().as_u16()));
        }
        let v: Value = res.json().await?;
        if let Some(err) = v.get("error") {
            let code = err.get("code").and_then(|c| c.as_i64()).unwrap_or_default();
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("rpc error")
                .to_string();
            return Err(FetchError::Rpc { code, message });
        }
        match v.get("result") {
            Some(r) => Ok(r.clone()),
            None => Err(FetchError::Decode("invalid rpc payload (no result)".into())),
        }
    }

    pub async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> FetchResult<R> {
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params});
        log::debug!("[rpc] {method} -> {}", self.url);

        let policy = if self.opts.retry_on_rate_limit {
            self.opts.rate_limit_retry
        } else {
            RetryPolicy::none()
        };
        let result = with_retry_if(
            method,
            policy,
            |e: &FetchError| matches!(e, FetchError::Http(429)),
            || self.post_once(&body),
        )
        .await?;

        Ok(serde_json::from_value(result)?)
    }

    fn block_config(&self, details: &str) -> Value {
        json!({
            "encoding": "json",
            "transactionDetails": details,
            "rewards": false,
            "maxSupportedTransactionVersion": 0,
            "commitment": self.opts.commitment.as_str(),
        })
    }
}

#[async_trait]
impl ChainRpc for RpcClient {
    async fn get_block_height(&self) -> FetchResult<u64> {
        self.call("getBlockHeight", json!([self.commitment()])).await
    }

    async fn get_blocks(&self, start: u64, end: u64) -> FetchResult<Vec<u64>> {
        self.call("getBlocks", json!([start, end, self.commitment()])).await
    }

    async fn get_block(&self, slot: u64) -> FetchResult<ConfirmedBlock> {
        let block: Option<ConfirmedBlock> = self
            .call("getBlock", json!([slot, self.block_config("signatures")]))
            .await?;
        block.ok_or_else(|| FetchError::not_found(format!("block {slot} not found")))
    }

    async fn get_block_signatures(&self, slot: u64) -> FetchResult<Vec<String>> {
        Ok(self.get_block(slot).await?.signatures)
    }

    async fn get_parsed_transaction(&self, signature: &str) -> FetchResult<Option<ParsedTransaction>> {
        self.call(
            "getTransaction",
            json!([signature, {
                "encoding": "jsonParsed",
                "maxSupportedTransactionVersion": 0,
                "commitment": self.opts.commitment.as_str(),
            }]),
        )
        .await
    }

    async fn get_signature_status(&self, signature: &str) -> FetchResult<Option<SignatureStatus>> {
        let res: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;
        Ok(res.value.into_iter().next().flatten())
    }

    async fn get_vote_accounts(&self) -> FetchResult<VoteAccounts> {
        self.call("getVoteAccounts", json!([self.commitment()])).await
    }

    async fn get_epoch_info(&self) -> FetchResult<EpochInfo> {
        self.call("getEpochInfo", json!([self.commitment()])).await
    }

    async fn get_epoch_schedule(&self) -> FetchResult<EpochSchedule> {
        self.call("getEpochSchedule", json!([])).await
    }

    async fn get_genesis_hash(&self) -> FetchResult<String> {
        self.call("getGenesisHash", json!([])).await
    }

    async fn get_first_available_block(&self) -> FetchResult<u64> {
        self.call("getFirstAvailableBlock", json!([])).await
    }

    async fn get_account_info(&self, address: &str) -> FetchResult<Option<Account>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawAccount {
            lamports: u64,
            owner: String,
            executable: bool,
            #[serde(default)]
            rent_epoch: u64,
            data: (String, String),
        }

        let res: WithContext<Option<RawAccount>> = self
            .call(
                "getAccountInfo",
                json!([address, { "encoding": "base64", "commitment": self.opts.commitment.as_str() }]),
            )
            .await?;
        let Some(raw) = res.value else {
            return Ok(None);
        };
        let data = B64
            .decode(raw.data.0.as_bytes())
            .map_err(|e| FetchError::Decode(format!("account data: {e}")))?;
        Ok(Some(Account {
            lamports: raw.lamports,
            owner: raw.owner,
            executable: raw.executable,
            rent_epoch: raw.rent_epoch,
            data,
        }))
    }

    async fn get_parsed_account_info(&self, address: &str) -> FetchResult<Option<ParsedAccount>> {
        let res: WithContext<Option<ParsedAccount>> = self
            .call(
                "getAccountInfo",
                json!([address, { "encoding": "jsonParsed", "commitment": self.opts.commitment.as_str() }]),
            )
            .await?;
        Ok(res.value)
    }

    async fn get_program_accounts(
        &self,
        program: &str,
        filters: &[ProgramAccountsFilter],
    ) -> FetchResult<Vec<KeyedAccount>> {
        let filters: Vec<Value> = filters.iter().map(|f| f.to_json()).collect();
        self.call(
            "getProgramAccounts",
            json!([program, {
                "encoding": "jsonParsed",
                "filters": filters,
                "commitment": self.opts.commitment.as_str(),
            }]),
        )
        .await
    }

    async fn get_largest_accounts(
        &self,
        filter: Option<LargestAccountsFilter>,
    ) -> FetchResult<Vec<LargestAccount>> {
        let mut cfg = self.commitment();
        if let Some(f) = filter {
            cfg["filter"] = serde_json::to_value(f)?;
        }
        let res: WithContext<Vec<LargestAccount>> =
            self.call("getLargestAccounts", json!([cfg])).await?;
        Ok(res.value)
    }

    async fn get_signatures_for_address(
        &self,
        address: &str,
        before: Option<&str>,
        limit: usize,
    ) -> FetchResult<Vec<SignatureInfo>> {
        let mut cfg = json!({ "limit": limit, "commitment": self.opts.commitment.as_str() });
        if let Some(b) = before {
            cfg["before"] = json!(b);
        }
        self.call("getSignaturesForAddress", json!([address, cfg])).await
    }
}

/// Connector that hands out [`RpcClient`]s sharing one set of options.
#[derive(Clone, Debug, Default)]
pub struct HttpConnector {
    opts: RpcOptions,
}

impl HttpConnector {
    pub fn new(opts: RpcOptions) -> Self {
        Self { opts }
    }
}

impl Connector for HttpConnector {
    fn connect(&self, url: &str) -> Arc<dyn ChainRpc> {
        Arc::new(RpcClient::new(url, self.opts.clone()))
    }
}
