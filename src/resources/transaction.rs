use super::validate_signature;
use crate::cache::CacheEntry;
use crate::error::{FetchError, FetchResult};
use crate::resource::{FetchScope, Resource};
use crate::rpc::ChainRpc;
use crate::types::{ParsedTransaction, TxDocument};
use crate::util_text::format_block_time;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetail {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub when: String,
    pub fee: Option<u64>,
    pub success: bool,
    pub error: Option<String>,
    pub confirmation_status: Option<String>,
    pub confirmations: Option<u64>,
    pub signers: Vec<String>,
    pub programs: Vec<String>,
    pub instruction_count: usize,
    pub log_messages: Vec<String>,
}

/// Program ids in first-seen order. Parsed instructions carry `programId`.
pub fn instruction_programs(instructions: &[Value]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for ix in instructions {
        if let Some(p) = ix.get("programId").and_then(|p| p.as_str()) {
            if !out.iter().any(|seen| seen == p) {
                out.push(p.to_string());
            }
        }
    }
    out
}

pub fn summarize(signature: &str, tx: &ParsedTransaction) -> TransactionDetail {
    let meta = tx.meta.as_ref();
    let err = meta.and_then(|m| m.err.as_ref()).filter(|e| !e.is_null());
    let instructions = &tx.transaction.message.instructions;
    TransactionDetail {
        signature: signature.to_string(),
        slot: tx.slot,
        block_time: tx.block_time,
        when: tx
            .block_time
            .map(format_block_time)
            .unwrap_or_else(|| "-".into()),
        fee: meta.map(|m| m.fee),
        success: err.is_none(),
        error: err.map(|e| e.to_string()),
        confirmation_status: None,
        confirmations: None,
        signers: tx
            .transaction
            .message
            .account_keys
            .iter()
            .filter(|k| k.signer)
            .map(|k| k.pubkey.clone())
            .collect(),
        programs: instruction_programs(instructions),
        instruction_count: instructions.len(),
        log_messages: meta
            .and_then(|m| m.log_messages.clone())
            .unwrap_or_default(),
    }
}

impl From<&TransactionDetail> for TxDocument {
    fn from(d: &TransactionDetail) -> Self {
        TxDocument {
            signature: d.signature.clone(),
            slot: d.slot,
            block_time: d.block_time,
            fee: d.fee,
            success: d.success,
            error: d.error.clone(),
            confirmation_status: d.confirmation_status.clone(),
            signer: d.signers.first().cloned(),
            programs: d.programs.clone(),
        }
    }
}

pub async fn load(rpc: &dyn ChainRpc, signature: &str) -> FetchResult<TransactionDetail> {
    validate_signature(signature)?;
    let (tx, status) = tokio::try_join!(
        rpc.get_parsed_transaction(signature),
        rpc.get_signature_status(signature)
    )?;
    let tx = tx.ok_or_else(|| FetchError::not_found("transaction not found"))?;

    let mut detail = summarize(signature, &tx);
    if let Some(status) = status {
        detail.confirmation_status = status.confirmation_status;
        detail.confirmations = status.confirmations;
    }
    Ok(detail)
}

/// Keyed by the signature.
pub async fn fetch(
    resource: &Resource<TransactionDetail>,
    scope: &FetchScope,
    rpc: &dyn ChainRpc,
    signature: &str,
) -> Option<CacheEntry<TransactionDetail>> {
    resource.fetch(scope, signature, load(rpc, signature)).await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::MockRpc;
    use crate::types::SignatureStatus;
    use serde_json::json;

    pub fn parsed_tx(signature: &str, slot: u64, err: Value) -> ParsedTransaction {
        serde_json::from_value(json!({
            "slot": slot,
            "blockTime": 1_700_000_000,
            "meta": {
                "fee": 5000,
                "err": err,
                "logMessages": ["Program 11111111111111111111111111111111 invoke [1]"],
                "preBalances": [10, 0],
                "postBalances": [5, 5]
            },
            "transaction": {
                "signatures": [signature],
                "message": {
                    "accountKeys": [
                        {"pubkey": "payer", "signer": true, "writable": true},
                        {"pubkey": "dest", "signer": false, "writable": true}
                    ],
                    "instructions": [
                        {"programId": "11111111111111111111111111111111", "parsed": {"type": "transfer"}},
                        {"programId": "ComputeBudget111111111111111111111111111111", "data": "x"},
                        {"programId": "11111111111111111111111111111111", "parsed": {"type": "transfer"}}
                    ]
                }
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn detail_merges_status() {
        let sig = bs58::encode([1u8; 64]).into_string();
        let mut rpc = MockRpc::default();
        rpc.transactions.insert(sig.clone(), parsed_tx(&sig, 77, Value::Null));
        rpc.statuses.insert(
            sig.clone(),
            SignatureStatus {
                slot: 77,
                confirmations: None,
                err: None,
                confirmation_status: Some("finalized".into()),
            },
        );

        let d = load(&rpc, &sig).await.unwrap();
        assert!(d.success);
        assert_eq!(d.fee, Some(5000));
        assert_eq!(d.signers, vec!["payer"]);
        assert_eq!(d.programs.len(), 2);
        assert_eq!(d.instruction_count, 3);
        assert_eq!(d.confirmation_status.as_deref(), Some("finalized"));
    }

    #[tokio::test]
    async fn failed_transaction_keeps_error() {
        let sig = bs58::encode([2u8; 64]).into_string();
        let mut rpc = MockRpc::default();
        rpc.transactions.insert(
            sig.clone(),
            parsed_tx(&sig, 5, json!({"InstructionError": [0, "Custom"]})),
        );
        let d = load(&rpc, &sig).await.unwrap();
        assert!(!d.success);
        assert!(d.error.unwrap().contains("InstructionError"));
    }

    #[tokio::test]
    async fn unknown_signature_is_not_found() {
        let sig = bs58::encode([3u8; 64]).into_string();
        let err = load(&MockRpc::default(), &sig).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
