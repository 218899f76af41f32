//! Wire shapes returned by the JSON-RPC node, plus the block row served by
//! the proxy. Field names follow the node's camelCase.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochInfo {
    pub absolute_slot: u64,
    pub block_height: u64,
    pub epoch: u64,
    pub slot_index: u64,
    pub slots_in_epoch: u64,
    #[serde(default)]
    pub transaction_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochSchedule {
    pub slots_per_epoch: u64,
    pub leader_schedule_slot_offset: u64,
    pub warmup: bool,
    pub first_normal_epoch: u64,
    pub first_normal_slot: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteAccountInfo {
    pub vote_pubkey: String,
    pub node_pubkey: String,
    pub activated_stake: u64,
    pub commission: u8,
    pub last_vote: u64,
    #[serde(default)]
    pub root_slot: u64,
    #[serde(default)]
    pub epoch_vote_account: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteAccounts {
    pub current: Vec<VoteAccountInfo>,
    pub delinquent: Vec<VoteAccountInfo>,
}

/// `getBlock` with `transactionDetails: "signatures"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedBlock {
    pub blockhash: String,
    pub previous_blockhash: String,
    pub parent_slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub signatures: Vec<String>,
}

/// One block in a `/api/latest_blocks` window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockRow {
    pub slot: u64,
    pub blockhash: String,
    pub parent_slot: u64,
    pub block_height: Option<u64>,
    pub block_time: Option<i64>,
    pub when: String,
    pub tx_count: usize,
}

impl BlockRow {
    pub fn from_block(slot: u64, block: &ConfirmedBlock) -> Self {
        Self {
            slot,
            blockhash: block.blockhash.clone(),
            parent_slot: block.parent_slot,
            block_height: block.block_height,
            block_time: block.block_time,
            when: block
                .block_time
                .map(crate::util_text::format_block_time)
                .unwrap_or_else(|| "-".into()),
            tx_count: block.signatures.len(),
        }
    }
}

/// Body of `GET /api/latest_blocks`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatestBlocksResponse {
    pub blocks: Vec<BlockRow>,
    /// Slot to pass as `block` for the next (older) window.
    pub next: u64,
}

/// One document in the rolling transaction index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxDocument {
    pub signature: String,
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub fee: Option<u64>,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub confirmation_status: Option<String>,
    #[serde(default)]
    pub signer: Option<String>,
    #[serde(default)]
    pub programs: Vec<String>,
}

/// Body of `GET /api/latest_transactions`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResponse {
    pub transaction_response: Vec<TxDocument>,
}

/// Body of `POST /api/latest_transactions`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    pub slot: u64,
    #[serde(default)]
    pub confirmations: Option<u64>,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub confirmation_status: Option<String>,
}

/// Raw account with its data decoded from base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub lamports: u64,
    pub owner: String,
    pub executable: bool,
    pub rent_epoch: u64,
    pub data: Vec<u8>,
}

/// Account fetched with `encoding: "jsonParsed"`. `data` is either the
/// parsed object or a `[base64, "base64"]` pair when the node can't parse it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedAccount {
    pub lamports: u64,
    pub owner: String,
    pub executable: bool,
    pub data: Value,
}

impl ParsedAccount {
    /// `data.parsed.type`, e.g. "mint" or "account".
    pub fn parsed_type(&self) -> Option<&str> {
        self.data.get("parsed")?.get("type")?.as_str()
    }

    pub fn parsed_info(&self) -> Option<&Value> {
        self.data.get("parsed")?.get("info")
    }

    pub fn program(&self) -> Option<&str> {
        self.data.get("program")?.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedAccount {
    pub pubkey: String,
    pub account: ParsedAccount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LargestAccount {
    pub address: String,
    pub lamports: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub confirmation_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    pub fee: u64,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub log_messages: Option<Vec<String>>,
    #[serde(default)]
    pub pre_balances: Vec<u64>,
    #[serde(default)]
    pub post_balances: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedAccountKey {
    pub pubkey: String,
    pub signer: bool,
    pub writable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedMessage {
    pub account_keys: Vec<ParsedAccountKey>,
    #[serde(default)]
    pub instructions: Vec<Value>,
    #[serde(default)]
    pub recent_blockhash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTransactionBody {
    pub signatures: Vec<String>,
    pub message: ParsedMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTransaction {
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
    pub transaction: ParsedTransactionBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramAccountsFilter {
    DataSize(u64),
    Memcmp { offset: usize, bytes: String },
}

impl ProgramAccountsFilter {
    pub fn to_json(&self) -> Value {
        match self {
            ProgramAccountsFilter::DataSize(n) => serde_json::json!({ "dataSize": n }),
            ProgramAccountsFilter::Memcmp { offset, bytes } => {
                serde_json::json!({ "memcmp": { "offset": offset, "bytes": bytes } })
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LargestAccountsFilter {
    Circulating,
    NonCirculating,
}

impl std::str::FromStr for LargestAccountsFilter {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "circulating" => Ok(LargestAccountsFilter::Circulating),
            "noncirculating" | "non-circulating" => Ok(LargestAccountsFilter::NonCirculating),
            _ => Err(anyhow::anyhow!(
                "Invalid filter '{s}'. Valid options: circulating, nonCirculating"
            )),
        }
    }
}
