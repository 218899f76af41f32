//! Token accounts held by an owner across both token programs. Mint details
//! are looked up in batches so a wallet with hundreds of tokens doesn't
//! fire hundreds of requests at once.

use super::mint::{self, MintDetail, TokenMetadata};
use super::{validate_address, TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID};
use crate::batch::fetch_in_batches;
use crate::cache::CacheEntry;
use crate::error::FetchResult;
use crate::resource::{FetchScope, Resource};
use crate::rpc::ChainRpc;
use crate::types::{KeyedAccount, ProgramAccountsFilter};
use crate::util_text::format_token_amount;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

pub const MINT_BATCH_SIZE: usize = 5;

/// Token account layout: mint (32) | owner (32) | amount (8) | ...
const OWNER_OFFSET: usize = 32;
const TOKEN_ACCOUNT_LEN: u64 = 165;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenHolding {
    pub account: String,
    pub mint: String,
    pub program: String,
    #[serde(serialize_with = "crate::util_text::serialize_u64_as_string")]
    pub amount: u64,
    pub decimals: u8,
    pub ui_amount: String,
    pub metadata: Option<TokenMetadata>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenHoldings {
    pub owner: String,
    pub tokens: Vec<TokenHolding>,
}

fn holding_from(keyed: &KeyedAccount) -> Option<TokenHolding> {
    if keyed.account.parsed_type() != Some("account") {
        return None;
    }
    let info = keyed.account.parsed_info()?;
    let token_amount = info.get("tokenAmount")?;
    let amount = token_amount.get("amount")?.as_str()?.parse::<u64>().ok()?;
    let raw_decimals = token_amount.get("decimals")?.as_u64()?;
    let (decimals, ui_amount) = match u8::try_from(raw_decimals) {
        Ok(d) => (d, format_token_amount(amount, d)),
        Err(_) => {
            log::warn!("token account {} reports {raw_decimals} decimals", keyed.pubkey);
            (0, amount.to_string())
        }
    };
    Some(TokenHolding {
        account: keyed.pubkey.clone(),
        mint: info.get("mint")?.as_str()?.to_string(),
        program: keyed.account.program().unwrap_or("spl-token").to_string(),
        amount,
        decimals,
        ui_amount,
        metadata: None,
    })
}

pub async fn load(rpc: &dyn ChainRpc, owner: &str, metadata_timeout: Duration) -> FetchResult<TokenHoldings> {
    validate_address(owner)?;

    let owner_filter = ProgramAccountsFilter::Memcmp {
        offset: OWNER_OFFSET,
        bytes: owner.to_string(),
    };
    let legacy_filters = [ProgramAccountsFilter::DataSize(TOKEN_ACCOUNT_LEN), owner_filter.clone()];
    // Token-2022 accounts carry extensions, so no fixed size
    let t22_filters = [owner_filter];
    let (legacy, t22) = tokio::try_join!(
        rpc.get_program_accounts(TOKEN_PROGRAM_ID, &legacy_filters),
        rpc.get_program_accounts(TOKEN_2022_PROGRAM_ID, &t22_filters),
    )?;

    let mut tokens: Vec<TokenHolding> = legacy.iter().chain(t22.iter()).filter_map(holding_from).collect();
    tokens.sort_by(|a, b| a.mint.cmp(&b.mint).then_with(|| a.account.cmp(&b.account)));

    let mut mints: Vec<String> = tokens.iter().map(|t| t.mint.clone()).collect();
    mints.dedup();
    let details: Vec<MintDetail> = fetch_in_batches(mints, MINT_BATCH_SIZE, "mint", |m| {
        let m = m.clone();
        async move { mint::load(rpc, &m, metadata_timeout).await }
    })
    .await;
    let by_mint: HashMap<String, MintDetail> = details.into_iter().map(|d| (d.address.clone(), d)).collect();

    for t in tokens.iter_mut() {
        if let Some(d) = by_mint.get(&t.mint) {
            t.metadata = d.metadata.clone();
        }
    }

    Ok(TokenHoldings {
        owner: owner.to_string(),
        tokens,
    })
}

/// Keyed by the owner address.
pub async fn fetch(
    resource: &Resource<TokenHoldings>,
    scope: &FetchScope,
    rpc: &dyn ChainRpc,
    owner: &str,
) -> Option<CacheEntry<TokenHoldings>> {
    resource
        .fetch(scope, owner, load(rpc, owner, mint::METADATA_TIMEOUT))
        .await
}
