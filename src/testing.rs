//! In-memory node used by unit tests.

use crate::error::{FetchError, FetchResult};
use crate::resource::{ErrorReporter, ReportContext};
use crate::rpc::{ChainRpc, Connector};
use crate::types::*;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct MockRpc {
    pub block_height: u64,
    pub blocks: HashMap<u64, ConfirmedBlock>,
    pub failing_blocks: HashSet<u64>,
    pub transactions: HashMap<String, ParsedTransaction>,
    pub statuses: HashMap<String, SignatureStatus>,
    pub accounts: HashMap<String, Account>,
    pub parsed_accounts: HashMap<String, ParsedAccount>,
    pub program_accounts: HashMap<String, Vec<KeyedAccount>>,
    pub largest: Vec<LargestAccount>,
    pub signatures: HashMap<String, Vec<SignatureInfo>>,
    pub vote_accounts: Option<VoteAccounts>,
    pub epoch_info: Option<EpochInfo>,
    pub epoch_schedule: Option<EpochSchedule>,
    pub genesis_hash: Option<String>,
    /// Added before answering height and handshake calls.
    pub latency: Duration,
    pub calls: Mutex<Vec<String>>,
}

fn missing(what: &str) -> FetchError {
    FetchError::Transport(format!("{what} not mocked"))
}

impl MockRpc {
    pub fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls_to(&self, prefix: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.starts_with(prefix)).count()
    }

    async fn lag(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    pub fn block(slot: u64, signatures: Vec<String>) -> ConfirmedBlock {
        ConfirmedBlock {
            blockhash: format!("hash{slot}"),
            previous_blockhash: format!("hash{}", slot.saturating_sub(1)),
            parent_slot: slot.saturating_sub(1),
            block_time: Some(1_700_000_000 + slot as i64),
            block_height: Some(slot),
            signatures,
        }
    }

    pub fn with_handshake(mut self) -> Self {
        self.epoch_info = Some(EpochInfo {
            absolute_slot: 1_000,
            block_height: 990,
            epoch: 2,
            slot_index: 100,
            slots_in_epoch: 432,
            transaction_count: None,
        });
        self.epoch_schedule = Some(EpochSchedule {
            slots_per_epoch: 432,
            leader_schedule_slot_offset: 432,
            warmup: false,
            first_normal_epoch: 0,
            first_normal_slot: 0,
        });
        self.genesis_hash = Some("5eykt4UsFv8P8NJdTREpY1vzqKqZKvdpKuc147dw2N9d".into());
        self
    }
}

#[async_trait]
impl ChainRpc for MockRpc {
    async fn get_block_height(&self) -> FetchResult<u64> {
        self.record("getBlockHeight".into());
        self.lag().await;
        Ok(self.block_height)
    }

    async fn get_blocks(&self, start: u64, end: u64) -> FetchResult<Vec<u64>> {
        self.record(format!("getBlocks {start} {end}"));
        let mut slots: Vec<u64> = self
            .blocks
            .keys()
            .chain(self.failing_blocks.iter())
            .copied()
            .filter(|s| (start..=end).contains(s))
            .collect();
        slots.sort_unstable();
        slots.dedup();
        Ok(slots)
    }

    async fn get_block(&self, slot: u64) -> FetchResult<ConfirmedBlock> {
        self.record(format!("getBlock {slot}"));
        if self.failing_blocks.contains(&slot) {
            return Err(FetchError::Http(503));
        }
        self.blocks
            .get(&slot)
            .cloned()
            .ok_or_else(|| FetchError::not_found(format!("block {slot} not found")))
    }

    async fn get_block_signatures(&self, slot: u64) -> FetchResult<Vec<String>> {
        Ok(self.get_block(slot).await?.signatures)
    }

    async fn get_parsed_transaction(&self, signature: &str) -> FetchResult<Option<ParsedTransaction>> {
        self.record(format!("getTransaction {signature}"));
        Ok(self.transactions.get(signature).cloned())
    }

    async fn get_signature_status(&self, signature: &str) -> FetchResult<Option<SignatureStatus>> {
        self.record(format!("getSignatureStatuses {signature}"));
        Ok(self.statuses.get(signature).cloned())
    }

    async fn get_vote_accounts(&self) -> FetchResult<VoteAccounts> {
        self.vote_accounts.clone().ok_or_else(|| missing("vote accounts"))
    }

    async fn get_epoch_info(&self) -> FetchResult<EpochInfo> {
        self.lag().await;
        self.epoch_info.clone().ok_or_else(|| missing("epoch info"))
    }

    async fn get_epoch_schedule(&self) -> FetchResult<EpochSchedule> {
        self.epoch_schedule.clone().ok_or_else(|| missing("epoch schedule"))
    }

    async fn get_genesis_hash(&self) -> FetchResult<String> {
        self.genesis_hash.clone().ok_or_else(|| missing("genesis hash"))
    }

    async fn get_first_available_block(&self) -> FetchResult<u64> {
        Ok(0)
    }

    async fn get_account_info(&self, address: &str) -> FetchResult<Option<Account>> {
        Ok(self.accounts.get(address).cloned())
    }

    async fn get_parsed_account_info(&self, address: &str) -> FetchResult<Option<ParsedAccount>> {
        self.record(format!("getParsedAccountInfo {address}"));
        Ok(self.parsed_accounts.get(address).cloned())
    }

    async fn get_program_accounts(
        &self,
        program: &str,
        _filters: &[ProgramAccountsFilter],
    ) -> FetchResult<Vec<KeyedAccount>> {
        Ok(self.program_accounts.get(program).cloned().unwrap_or_default())
    }

    async fn get_largest_accounts(
        &self,
        _filter: Option<LargestAccountsFilter>,
    ) -> FetchResult<Vec<LargestAccount>> {
        Ok(self.largest.clone())
    }

    async fn get_signatures_for_address(
        &self,
        address: &str,
        before: Option<&str>,
        limit: usize,
    ) -> FetchResult<Vec<SignatureInfo>> {
        let all = self.signatures.get(address).cloned().unwrap_or_default();
        let start = match before {
            Some(b) => all.iter().position(|s| s.signature == b).map_or(all.len(), |i| i + 1),
            None => 0,
        };
        Ok(all.into_iter().skip(start).take(limit).collect())
    }
}

/// Hands out the same mock for every URL it knows; unknown URLs get an
/// empty node whose handshake fails.
#[derive(Default)]
pub struct MockConnector {
    pub nodes: HashMap<String, Arc<MockRpc>>,
}

impl Connector for MockConnector {
    fn connect(&self, url: &str) -> Arc<dyn ChainRpc> {
        match self.nodes.get(url) {
            Some(rpc) => rpc.clone(),
            None => Arc::new(MockRpc::default()),
        }
    }
}

/// Collects reports as "resource:key:error" lines.
#[derive(Default)]
pub struct Recorder(pub Mutex<Vec<String>>);

impl Recorder {
    pub fn reports(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl ErrorReporter for Recorder {
    fn report(&self, ctx: &ReportContext<'_>, error: &FetchError) {
        self.0
            .lock()
            .unwrap()
            .push(format!("{}:{}:{error}", ctx.resource, ctx.key));
    }
}
