//! Rolling transaction index keeps only the last 300 slots

mod common;

use common::FakeNode;
use solx::api::{refresh_index, IndexOutcome, IndexSettings};
use solx::retry::RetryPolicy;
use solx::store::TxIndex;
use solx::types::TxDocument;

fn doc(slot: u64) -> TxDocument {
    TxDocument {
        signature: format!("sig-{slot}"),
        slot,
        block_time: None,
        fee: Some(5000),
        success: true,
        error: None,
        confirmation_status: Some("finalized".into()),
        signer: None,
        programs: vec![],
    }
}

#[tokio::test]
async fn refresh_prunes_slots_behind_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");
    let index = TxIndex::open(path.to_str().unwrap()).unwrap();
    index
        .insert_many("mainnet-beta", [100, 150, 200, 500].into_iter().map(doc).collect())
        .await
        .unwrap();

    // node tip equals the latest indexed slot: nothing new to pull
    let node = FakeNode::with_blocks(500, 1);
    let settings = IndexSettings {
        retry: RetryPolicy::none(),
        ..IndexSettings::default()
    };
    let outcome = refresh_index(&node, &index, "mainnet-beta", settings).await.unwrap();
    assert_eq!(
        outcome,
        IndexOutcome::Updated {
            inserted: 0,
            pruned: 2,
            latest_slot: Some(500)
        }
    );

    let slots: Vec<u64> = index
        .page("mainnet-beta", 0, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.slot)
        .collect();
    assert_eq!(slots, vec![500, 200]);
}

#[tokio::test]
async fn networks_are_pruned_independently() {
    let index = TxIndex::open_in_memory().unwrap();
    index
        .insert_many("testnet", [10, 20].into_iter().map(doc).collect())
        .await
        .unwrap();
    index
        .insert_many("mainnet-beta", [100, 500].into_iter().map(doc).collect())
        .await
        .unwrap();

    let node = FakeNode::with_blocks(500, 1);
    refresh_index(&node, &index, "mainnet-beta", IndexSettings::default())
        .await
        .unwrap();
    assert_eq!(index.count("mainnet-beta").await.unwrap(), 1);
    assert_eq!(index.count("testnet").await.unwrap(), 2);
}
