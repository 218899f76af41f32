use crate::api_client::ApiClient;
use crate::cache::CacheEntry;
use crate::error::FetchResult;
use crate::resource::{FetchScope, Resource};
use crate::types::{MessageResponse, TxDocument};
use serde::Serialize;

pub const KEY: &str = "transactions";
pub const DEFAULT_DOCS: usize = 25;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestTransactions {
    pub page: usize,
    pub docs: usize,
    pub transactions: Vec<TxDocument>,
    /// A short page means the index has nothing older.
    pub found_oldest: bool,
}

pub async fn load(
    api: &ApiClient,
    scope: &FetchScope,
    page: usize,
    docs: usize,
) -> FetchResult<LatestTransactions> {
    let docs = docs.max(1);
    let res = api
        .latest_transactions(page, docs, scope.cluster.name(), &scope.url)
        .await?;
    Ok(LatestTransactions {
        page,
        docs,
        found_oldest: res.transaction_response.len() < docs,
        transactions: res.transaction_response,
    })
}

pub async fn fetch(
    resource: &Resource<LatestTransactions>,
    scope: &FetchScope,
    api: &ApiClient,
    page: usize,
    docs: usize,
) -> Option<CacheEntry<LatestTransactions>> {
    resource.fetch(scope, KEY, load(api, scope, page, docs)).await
}

/// Ask the proxy to pull new blocks into the index.
pub async fn refresh(api: &ApiClient, scope: &FetchScope) -> FetchResult<MessageResponse> {
    api.refresh_transactions(scope.cluster.name(), &scope.url).await
}
