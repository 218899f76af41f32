//! Per-resource fetchers.
//!
//! Each module has a `load` that talks to the node and builds the payload,
//! and a `fetch` that runs `load` through the resource's cache.

pub mod address;
pub mod address_history;
pub mod epoch;
pub mod latest_blocks;
pub mod latest_transactions;
pub mod mint;
pub mod tokens;
pub mod top_accounts;
pub mod transaction;
pub mod validators;

use crate::error::{FetchError, FetchResult};

pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

fn decoded_len(s: &str) -> Option<usize> {
    bs58::decode(s.trim()).into_vec().ok().map(|v| v.len())
}

/// Base58 public key (32 bytes).
pub fn validate_address(address: &str) -> FetchResult<()> {
    match decoded_len(address) {
        Some(32) => Ok(()),
        _ => Err(FetchError::invalid(format!("invalid address {address}"))),
    }
}

/// Base58 transaction signature (64 bytes).
pub fn validate_signature(signature: &str) -> FetchResult<()> {
    match decoded_len(signature) {
        Some(64) => Ok(()),
        _ => Err(FetchError::invalid(format!("invalid signature {signature}"))),
    }
}
