use crate::api_client::ApiClient;
use crate::cache::CacheEntry;
use crate::resource::{FetchScope, Resource};
use crate::types::LatestBlocksResponse;

pub const KEY: &str = "blocks";

/// Window ending at `before` (or the tip), replacing the cached one.
pub async fn fetch(
    resource: &Resource<LatestBlocksResponse>,
    scope: &FetchScope,
    api: &ApiClient,
    before: Option<u64>,
) -> Option<CacheEntry<LatestBlocksResponse>> {
    resource
        .fetch(scope, KEY, api.latest_blocks(before, &scope.url))
        .await
}
