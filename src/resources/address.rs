use super::validate_address;
use crate::cache::CacheEntry;
use crate::error::{FetchError, FetchResult};
use crate::resource::{FetchScope, Resource};
use crate::rpc::ChainRpc;
use crate::util_text::format_sol;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDetail {
    pub address: String,
    #[serde(serialize_with = "crate::util_text::serialize_u64_as_string")]
    pub lamports: u64,
    pub balance: String,
    pub owner: String,
    pub executable: bool,
    pub data_len: usize,
    #[serde(serialize_with = "crate::util_text::serialize_u64_as_string")]
    pub rent_epoch: u64,
}

pub async fn load(rpc: &dyn ChainRpc, address: &str) -> FetchResult<AccountDetail> {
    validate_address(address)?;
    let account = rpc
        .get_account_info(address)
        .await?
        .ok_or_else(|| FetchError::not_found("account not found"))?;

    Ok(AccountDetail {
        address: address.to_string(),
        lamports: account.lamports,
        balance: format_sol(account.lamports),
        owner: account.owner,
        executable: account.executable,
        data_len: account.data.len(),
        rent_epoch: account.rent_epoch,
    })
}

/// Keyed by the address itself.
pub async fn fetch(
    resource: &Resource<AccountDetail>,
    scope: &FetchScope,
    rpc: &dyn ChainRpc,
    address: &str,
) -> Option<CacheEntry<AccountDetail>> {
    resource.fetch(scope, address, load(rpc, address)).await
}
