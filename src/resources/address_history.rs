//! Signature history for an address, newest first, paged with a `before`
//! cursor. "Load more" appends the next page to what is already cached.

use super::validate_address;
use crate::cache::CacheEntry;
use crate::error::FetchResult;
use crate::resource::{FetchScope, Resource};
use crate::rpc::ChainRpc;
use crate::types::SignatureInfo;
use serde::Serialize;

pub const DEFAULT_PAGE: usize = 25;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressHistory {
    pub address: String,
    pub signatures: Vec<SignatureInfo>,
    pub found_oldest: bool,
}

impl AddressHistory {
    /// Cursor for the next page: the oldest signature seen so far.
    pub fn next_before(&self) -> Option<&str> {
        self.signatures.last().map(|s| s.signature.as_str())
    }

    fn append(mut self, page: AddressHistory) -> Self {
        self.signatures.extend(page.signatures);
        self.found_oldest = page.found_oldest;
        self
    }
}

pub async fn load_page(
    rpc: &dyn ChainRpc,
    address: &str,
    before: Option<&str>,
    limit: usize,
) -> FetchResult<AddressHistory> {
    validate_address(address)?;
    let limit = limit.clamp(1, 1000);
    let signatures = rpc.get_signatures_for_address(address, before, limit).await?;
    Ok(AddressHistory {
        address: address.to_string(),
        found_oldest: signatures.len() < limit,
        signatures,
    })
}

/// First page, replacing whatever is cached for the address.
pub async fn fetch(
    resource: &Resource<AddressHistory>,
    scope: &FetchScope,
    rpc: &dyn ChainRpc,
    address: &str,
    limit: usize,
) -> Option<CacheEntry<AddressHistory>> {
    resource
        .fetch(scope, address, load_page(rpc, address, None, limit))
        .await
}

/// Next page appended to the cached history. Falls back to a first page
/// when nothing is cached yet; a no-op once the oldest signature was seen.
pub async fn load_more(
    resource: &Resource<AddressHistory>,
    scope: &FetchScope,
    rpc: &dyn ChainRpc,
    address: &str,
    limit: usize,
) -> Option<CacheEntry<AddressHistory>> {
    let Some(previous) = resource.data(&scope.url, address) else {
        return fetch(resource, scope, rpc, address, limit).await;
    };
    if previous.found_oldest {
        return resource.get(&scope.url, address);
    }

    let before = previous.next_before().map(str::to_string);
    let work = async move {
        let page = load_page(rpc, address, before.as_deref(), limit).await?;
        Ok(previous.append(page))
    };
    resource.fetch(scope, address, work).await
}
