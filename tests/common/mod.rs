//! Scriptable node shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use solx::error::{FetchError, FetchResult};
use solx::rpc::{ChainRpc, Connector};
use solx::types::*;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct FakeNode {
    pub height: u64,
    pub blocks: HashMap<u64, ConfirmedBlock>,
    pub broken: HashSet<u64>,
    pub balances: HashMap<String, u64>,
    pub log: Mutex<Vec<String>>,
}

impl FakeNode {
    pub fn with_blocks(height: u64, count: u64) -> Self {
        let mut node = FakeNode {
            height,
            ..Default::default()
        };
        for slot in (height + 1 - count)..=height {
            node.blocks.insert(
                slot,
                ConfirmedBlock {
                    blockhash: format!("hash{slot}"),
                    previous_blockhash: format!("hash{}", slot - 1),
                    parent_slot: slot - 1,
                    block_time: Some(1_700_000_000 + slot as i64),
                    block_height: Some(slot),
                    signatures: vec![],
                },
            );
        }
        node
    }

    pub fn hits(&self, prefix: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn note(&self, call: String) {
        self.log.lock().unwrap().push(call);
    }
}

fn unsupported<T>(method: &str) -> FetchResult<T> {
    Err(FetchError::Transport(format!("{method} unsupported by fake node")))
}

#[async_trait]
impl ChainRpc for FakeNode {
    async fn get_block_height(&self) -> FetchResult<u64> {
        Ok(self.height)
    }

    async fn get_blocks(&self, start: u64, end: u64) -> FetchResult<Vec<u64>> {
        let mut slots: Vec<u64> = self
            .blocks
            .keys()
            .copied()
            .filter(|s| (start..=end).contains(s))
            .collect();
        slots.sort_unstable();
        Ok(slots)
    }

    async fn get_block(&self, slot: u64) -> FetchResult<ConfirmedBlock> {
        self.note(format!("getBlock {slot}"));
        if self.broken.contains(&slot) {
            return Err(FetchError::Http(503));
        }
        self.blocks
            .get(&slot)
            .cloned()
            .ok_or_else(|| FetchError::not_found(format!("block {slot}")))
    }

    async fn get_block_signatures(&self, slot: u64) -> FetchResult<Vec<String>> {
        Ok(self.get_block(slot).await?.signatures)
    }

    async fn get_parsed_transaction(&self, _signature: &str) -> FetchResult<Option<ParsedTransaction>> {
        Ok(None)
    }

    async fn get_signature_status(&self, _signature: &str) -> FetchResult<Option<SignatureStatus>> {
        Ok(None)
    }

    async fn get_vote_accounts(&self) -> FetchResult<VoteAccounts> {
        unsupported("getVoteAccounts")
    }

    async fn get_epoch_info(&self) -> FetchResult<EpochInfo> {
        Ok(EpochInfo {
            absolute_slot: self.height,
            block_height: self.height,
            epoch: 7,
            slot_index: 10,
            slots_in_epoch: 100,
            transaction_count: None,
        })
    }

    async fn get_epoch_schedule(&self) -> FetchResult<EpochSchedule> {
        Ok(EpochSchedule {
            slots_per_epoch: 100,
            leader_schedule_slot_offset: 100,
            warmup: false,
            first_normal_epoch: 0,
            first_normal_slot: 0,
        })
    }

    async fn get_genesis_hash(&self) -> FetchResult<String> {
        Ok("4uhcVJyU9pJkvQyS88uRDiswHXSCkY3zQawwpjk2NsNY".into())
    }

    async fn get_first_available_block(&self) -> FetchResult<u64> {
        Ok(0)
    }

    async fn get_account_info(&self, address: &str) -> FetchResult<Option<Account>> {
        self.note(format!("getAccountInfo {address}"));
        Ok(self.balances.get(address).map(|lamports| Account {
            lamports: *lamports,
            owner: "11111111111111111111111111111111".into(),
            executable: false,
            rent_epoch: 0,
            data: vec![],
        }))
    }

    async fn get_parsed_account_info(&self, _address: &str) -> FetchResult<Option<ParsedAccount>> {
        Ok(None)
    }

    async fn get_program_accounts(
        &self,
        _program: &str,
        _filters: &[ProgramAccountsFilter],
    ) -> FetchResult<Vec<KeyedAccount>> {
        Ok(vec![])
    }

    async fn get_largest_accounts(
        &self,
        _filter: Option<LargestAccountsFilter>,
    ) -> FetchResult<Vec<LargestAccount>> {
        unsupported("getLargestAccounts")
    }

    async fn get_signatures_for_address(
        &self,
        _address: &str,
        _before: Option<&str>,
        _limit: usize,
    ) -> FetchResult<Vec<SignatureInfo>> {
        Ok(vec![])
    }
}

/// Routes each endpoint URL to its own fake node.
#[derive(Default)]
pub struct FakeNetwork {
    pub nodes: HashMap<String, Arc<FakeNode>>,
}

impl Connector for FakeNetwork {
    fn connect(&self, url: &str) -> Arc<dyn ChainRpc> {
        match self.nodes.get(url) {
            Some(node) => node.clone(),
            None => Arc::new(FakeNode::default()),
        }
    }
}
