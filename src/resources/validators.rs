use crate::cache::CacheEntry;
use crate::error::FetchResult;
use crate::resource::{FetchScope, Resource};
use crate::rpc::ChainRpc;
use crate::types::VoteAccountInfo;
use serde::Serialize;

pub const KEY: &str = "validators";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorRow {
    pub vote_pubkey: String,
    pub node_pubkey: String,
    #[serde(serialize_with = "crate::util_text::serialize_u64_as_string")]
    pub activated_stake: u64,
    pub commission: u8,
    pub last_vote: u64,
    pub delinquent: bool,
}

impl ValidatorRow {
    fn from_vote(v: VoteAccountInfo, delinquent: bool) -> Self {
        Self {
            vote_pubkey: v.vote_pubkey,
            node_pubkey: v.node_pubkey,
            activated_stake: v.activated_stake,
            commission: v.commission,
            last_vote: v.last_vote,
            delinquent,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Validators {
    pub current: Vec<ValidatorRow>,
    pub delinquent: Vec<ValidatorRow>,
    #[serde(serialize_with = "crate::util_text::serialize_u64_as_string")]
    pub total_stake: u64,
    #[serde(serialize_with = "crate::util_text::serialize_u64_as_string")]
    pub delinquent_stake: u64,
}

fn by_stake(rows: &mut [ValidatorRow]) {
    rows.sort_by(|a, b| {
        b.activated_stake
            .cmp(&a.activated_stake)
            .then_with(|| a.vote_pubkey.cmp(&b.vote_pubkey))
    });
}

pub async fn load(rpc: &dyn ChainRpc) -> FetchResult<Validators> {
    let accounts = rpc.get_vote_accounts().await?;

    let mut current: Vec<ValidatorRow> = accounts
        .current
        .into_iter()
        .map(|v| ValidatorRow::from_vote(v, false))
        .collect();
    let mut delinquent: Vec<ValidatorRow> = accounts
        .delinquent
        .into_iter()
        .map(|v| ValidatorRow::from_vote(v, true))
        .collect();
    by_stake(&mut current);
    by_stake(&mut delinquent);

    let delinquent_stake = delinquent.iter().map(|v| v.activated_stake).sum::<u64>();
    let total_stake = current.iter().map(|v| v.activated_stake).sum::<u64>() + delinquent_stake;

    Ok(Validators {
        current,
        delinquent,
        total_stake,
        delinquent_stake,
    })
}

pub async fn fetch(
    resource: &Resource<Validators>,
    scope: &FetchScope,
    rpc: &dyn ChainRpc,
) -> Option<CacheEntry<Validators>> {
    resource.fetch(scope, KEY, load(rpc)).await
}
