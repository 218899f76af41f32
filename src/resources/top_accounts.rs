use crate::cache::CacheEntry;
use crate::error::FetchResult;
use crate::resource::{FetchScope, Resource};
use crate::rpc::ChainRpc;
use crate::types::LargestAccountsFilter;
use crate::util_text::format_sol;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopAccount {
    pub rank: usize,
    pub address: String,
    #[serde(serialize_with = "crate::util_text::serialize_u64_as_string")]
    pub lamports: u64,
    pub balance: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopAccounts {
    pub filter: Option<LargestAccountsFilter>,
    pub accounts: Vec<TopAccount>,
}

pub fn key(filter: Option<LargestAccountsFilter>) -> &'static str {
    match filter {
        None => "largest",
        Some(LargestAccountsFilter::Circulating) => "largest:circulating",
        Some(LargestAccountsFilter::NonCirculating) => "largest:nonCirculating",
    }
}

pub async fn load(rpc: &dyn ChainRpc, filter: Option<LargestAccountsFilter>) -> FetchResult<TopAccounts> {
    let mut largest = rpc.get_largest_accounts(filter).await?;
    largest.sort_by(|a, b| b.lamports.cmp(&a.lamports));
    let accounts = largest
        .into_iter()
        .enumerate()
        .map(|(i, a)| TopAccount {
            rank: i + 1,
            balance: format_sol(a.lamports),
            address: a.address,
            lamports: a.lamports,
        })
        .collect();
    Ok(TopAccounts { filter, accounts })
}

pub async fn fetch(
    resource: &Resource<TopAccounts>,
    scope: &FetchScope,
    rpc: &dyn ChainRpc,
    filter: Option<LargestAccountsFilter>,
) -> Option<CacheEntry<TopAccounts>> {
    resource.fetch(scope, key(filter), load(rpc, filter)).await
}
