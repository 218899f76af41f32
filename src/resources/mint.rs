//! Mint accounts of either token program, plus the Token-2022 metadata
//! extension when present.

use super::validate_address;
use crate::cache::CacheEntry;
use crate::error::{FetchError, FetchResult};
use crate::resource::{FetchScope, Resource};
use crate::rpc::{http_client, ChainRpc};
use crate::types::ParsedAccount;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Off-chain metadata documents live on arbitrary hosts.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintDetail {
    pub address: String,
    pub program: String,
    #[serde(serialize_with = "crate::util_text::serialize_u64_as_string")]
    pub supply: u64,
    pub decimals: u8,
    pub mint_authority: Option<String>,
    pub freeze_authority: Option<String>,
    pub is_initialized: bool,
    pub metadata: Option<TokenMetadata>,
}

fn str_field(info: &Value, key: &str) -> Option<String> {
    info.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn metadata_extension(info: &Value) -> Option<TokenMetadata> {
    let ext = info
        .get("extensions")?
        .as_array()?
        .iter()
        .find(|e| e.get("extension").and_then(|x| x.as_str()) == Some("tokenMetadata"))?;
    let state = ext.get("state")?;
    Some(TokenMetadata {
        name: str_field(state, "name").unwrap_or_default(),
        symbol: str_field(state, "symbol").unwrap_or_default(),
        uri: str_field(state, "uri").unwrap_or_default(),
        json: None,
    })
}

/// Build a mint detail out of a jsonParsed account. `None` if the account
/// is not a mint.
pub fn parse_mint(address: &str, account: &ParsedAccount) -> Option<MintDetail> {
    if account.parsed_type() != Some("mint") {
        return None;
    }
    let info = account.parsed_info()?;
    Some(MintDetail {
        address: address.to_string(),
        program: account.program().unwrap_or("spl-token").to_string(),
        supply: info
            .get("supply")
            .and_then(|s| s.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        decimals: info
            .get("decimals")
            .and_then(|d| d.as_u64())
            .and_then(|d| u8::try_from(d).ok())
            .unwrap_or(0),
        mint_authority: str_field(info, "mintAuthority"),
        freeze_authority: str_field(info, "freezeAuthority"),
        is_initialized: info
            .get("isInitialized")
            .and_then(|b| b.as_bool())
            .unwrap_or(false),
        metadata: metadata_extension(info),
    })
}

/// GET a metadata JSON document with a hard deadline.
pub async fn fetch_metadata_json(uri: &str, timeout: Duration) -> FetchResult<Value> {
    let parsed = url::Url::parse(uri).map_err(|e| FetchError::invalid(format!("metadata uri: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(FetchError::invalid(format!("metadata uri scheme {}", parsed.scheme())));
    }
    let res = http_client().get(parsed).timeout(timeout).send().await?;
    if !res.status().is_success() {
        return Err(FetchError::Http(res.status().as_u16()));
    }
    Ok(res.json().await?)
}

pub async fn load(rpc: &dyn ChainRpc, address: &str, metadata_timeout: Duration) -> FetchResult<MintDetail> {
    validate_address(address)?;
    let account = rpc
        .get_parsed_account_info(address)
        .await?
        .ok_or_else(|| FetchError::not_found("mint not found"))?;
    let mut mint = parse_mint(address, &account).ok_or_else(|| FetchError::not_found("mint not found"))?;

    if let Some(meta) = mint.metadata.as_mut() {
        if !meta.uri.is_empty() {
            match fetch_metadata_json(&meta.uri, metadata_timeout).await {
                Ok(json) => meta.json = Some(json),
                Err(e) => log::debug!("[mint] metadata for {address} unavailable: {e}"),
            }
        }
    }
    Ok(mint)
}

/// Keyed by the mint address.
pub async fn fetch(
    resource: &Resource<MintDetail>,
    scope: &FetchScope,
    rpc: &dyn ChainRpc,
    address: &str,
) -> Option<CacheEntry<MintDetail>> {
    resource
        .fetch(scope, address, load(rpc, address, METADATA_TIMEOUT))
        .await
}
