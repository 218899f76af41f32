//! Server-side aggregation behind `/api/latest_blocks` and
//! `/api/latest_transactions`.

#[cfg(feature = "proxy")]
pub mod routes;

use crate::batch::fetch_in_batches;
use crate::error::{FetchError, FetchResult};
use crate::resources::transaction;
use crate::retry::{with_retry_if, RetryPolicy};
use crate::rpc::ChainRpc;
use crate::store::TxIndex;
use crate::types::{BlockRow, LatestBlocksResponse, TxDocument};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const BLOCK_WINDOW: usize = 25;
pub const PRUNE_BEHIND_SLOTS: u64 = 300;

fn retryable(e: &FetchError) -> bool {
    e.is_transient()
}

/// Newest `window` blocks at or below `before` (or the current height),
/// newest first. Blocks that still fail after retrying are left out.
pub async fn latest_blocks_window(
    rpc: &dyn ChainRpc,
    before: Option<u64>,
    window: usize,
    batch_size: usize,
    retry: RetryPolicy,
) -> FetchResult<LatestBlocksResponse> {
    let window = window.max(1);
    let end = match before {
        Some(b) => b,
        None => with_retry_if("getBlockHeight", retry, retryable, || rpc.get_block_height()).await?,
    };
    let start = end.saturating_sub(window as u64);
    let mut slots = with_retry_if("getBlocks", retry, retryable, || rpc.get_blocks(start, end)).await?;
    slots.sort_unstable_by(|a, b| b.cmp(a));
    slots.truncate(window);

    let blocks = fetch_in_batches(slots.clone(), batch_size, "getBlock", |slot: &u64| {
        let slot = *slot;
        async move {
            let label = format!("getBlock {slot}");
            let block = with_retry_if(&label, retry, retryable, || rpc.get_block(slot)).await?;
            Ok::<_, FetchError>(BlockRow::from_block(slot, &block))
        }
    })
    .await;

    let next = slots
        .last()
        .copied()
        .unwrap_or(start)
        .saturating_sub(1);
    log::debug!(
        "[api] latest_blocks {}..={end}: {}/{} blocks, next {next}",
        start,
        blocks.len(),
        slots.len()
    );
    Ok(LatestBlocksResponse { blocks, next })
}

#[derive(Clone, Copy, Debug)]
pub struct IndexSettings {
    /// Slots scanned per refresh, also the catch-up bound after a gap.
    pub max_catchup: usize,
    pub max_transactions: usize,
    pub batch_size: usize,
    pub retry: RetryPolicy,
    pub prune_behind: u64,
    pub lease_ttl: Duration,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            max_catchup: BLOCK_WINDOW,
            max_transactions: 200,
            batch_size: 5,
            retry: RetryPolicy::default(),
            prune_behind: PRUNE_BEHIND_SLOTS,
            lease_ttl: Duration::from_secs(120),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexOutcome {
    Updated {
        inserted: usize,
        pruned: usize,
        latest_slot: Option<u64>,
    },
    /// Another refresh for the same network holds the lease.
    Busy,
}

static HOLDER_SEQ: AtomicU64 = AtomicU64::new(0);

fn lease_holder() -> String {
    format!(
        "{}-{}-{}",
        std::process::id(),
        chrono::Utc::now().timestamp_millis(),
        HOLDER_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

pub fn lease_name(network: &str) -> String {
    format!("index:{network}")
}

/// Releases the index lease when dropped, including when the refresh future
/// is cancelled mid-flight.
struct LeaseGuard<'a> {
    store: &'a TxIndex,
    name: String,
    holder: String,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        self.store.release_lease_detached(&self.name, &self.holder);
    }
}

/// Pull blocks newer than the last indexed slot into the index and prune
/// documents that fell too far behind. At most one refresh per network runs
/// at a time.
pub async fn refresh_index(
    rpc: &dyn ChainRpc,
    store: &TxIndex,
    network: &str,
    settings: IndexSettings,
) -> FetchResult<IndexOutcome> {
    let name = lease_name(network);
    let holder = lease_holder();
    if !store.try_acquire_lease(&name, &holder, settings.lease_ttl).await? {
        log::info!("[index] {network}: refresh already in progress");
        return Ok(IndexOutcome::Busy);
    }
    let _lease = LeaseGuard { store, name, holder };

    index_new_blocks(rpc, store, network, &settings).await
}

async fn index_new_blocks(
    rpc: &dyn ChainRpc,
    store: &TxIndex,
    network: &str,
    settings: &IndexSettings,
) -> FetchResult<IndexOutcome> {
    let retry = settings.retry;
    let window = settings.max_catchup.max(1) as u64;
    let tip = with_retry_if("getBlockHeight", retry, retryable, || rpc.get_block_height()).await?;
    let last = store.latest_slot(network).await?;

    let start = match last {
        Some(s) => (s + 1).max(tip.saturating_sub(window)),
        None => tip.saturating_sub(window),
    };
    if start > tip {
        log::debug!("[index] {network}: up to date at {tip}");
        return prune(store, network, settings, 0).await;
    }

    let mut slots = with_retry_if("getBlocks", retry, retryable, || rpc.get_blocks(start, tip)).await?;
    slots.sort_unstable_by(|a, b| b.cmp(a));
    slots.truncate(window as usize);

    let per_block = fetch_in_batches(slots, settings.batch_size, "getBlockSignatures", |slot: &u64| {
        let slot = *slot;
        async move {
            let label = format!("getBlockSignatures {slot}");
            with_retry_if(&label, retry, retryable, || rpc.get_block_signatures(slot)).await
        }
    })
    .await;

    // newest blocks first, capped
    let signatures: Vec<String> = per_block
        .into_iter()
        .flatten()
        .take(settings.max_transactions)
        .collect();

    let docs: Vec<TxDocument> = fetch_in_batches(signatures, settings.batch_size, "getTransaction", |sig: &String| {
        let sig = sig.clone();
        async move {
            let detail = with_retry_if("getTransaction", retry, retryable, || transaction::load(rpc, &sig)).await?;
            Ok::<_, FetchError>(TxDocument::from(&detail))
        }
    })
    .await;

    let inserted = store.insert_many(network, docs).await?;
    log::info!("[index] {network}: indexed {inserted} transactions from slots {start}..={tip}");
    prune(store, network, settings, inserted).await
}

async fn prune(
    store: &TxIndex,
    network: &str,
    settings: &IndexSettings,
    inserted: usize,
) -> FetchResult<IndexOutcome> {
    let latest_slot = store.latest_slot(network).await?;
    let pruned = match latest_slot {
        Some(latest) => store
            .prune_below(network, latest.saturating_sub(settings.prune_behind))
            .await?,
        None => 0,
    };
    if pruned > 0 {
        log::debug!("[index] {network}: pruned {pruned} documents");
    }
    Ok(IndexOutcome::Updated {
        inserted,
        pruned,
        latest_slot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::transaction::tests::parsed_tx;
    use crate::testing::MockRpc;
    use serde_json::Value;

    fn quick_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10))
    }

    fn sig(slot: u64, n: u8) -> String {
        let mut bytes = [0u8; 64];
        bytes[..8].copy_from_slice(&slot.to_le_bytes());
        bytes[8] = n;
        bytes[63] = 1;
        bs58::encode(bytes).into_string()
    }

    fn chain(tip: u64, count: u64, failing: &[u64]) -> MockRpc {
        let mut rpc = MockRpc {
            block_height: tip,
            ..MockRpc::default()
        };
        for slot in (tip + 1 - count)..=tip {
            if failing.contains(&slot) {
                rpc.failing_blocks.insert(slot);
                continue;
            }
            let sigs = vec![sig(slot, 0), sig(slot, 1)];
            for s in &sigs {
                rpc.transactions.insert(s.clone(), parsed_tx(s, slot, Value::Null));
            }
            rpc.blocks.insert(slot, MockRpc::block(slot, sigs));
        }
        rpc
    }

    #[tokio::test(start_paused = true)]
    async fn window_omits_blocks_that_keep_failing() {
        let rpc = chain(1_000, 25, &[990]);
        let res = latest_blocks_window(&rpc, None, BLOCK_WINDOW, 5, quick_retry())
            .await
            .unwrap();
        assert_eq!(res.blocks.len(), 24);
        assert!(res.blocks.iter().all(|b| b.slot != 990));
        assert_eq!(res.blocks[0].slot, 1_000);
        assert_eq!(res.next, 975);
        assert_eq!(rpc.calls_to("getBlock 990"), 3);
        assert_eq!(rpc.calls_to("getBlocks 975 1000"), 1);
    }

    #[tokio::test]
    async fn window_keeps_only_newest_slots() {
        let rpc = chain(100, 40, &[]);
        let res = latest_blocks_window(&rpc, Some(90), 10, 5, quick_retry())
            .await
            .unwrap();
        let slots: Vec<u64> = res.blocks.iter().map(|b| b.slot).collect();
        assert_eq!(slots, (81..=90).rev().collect::<Vec<_>>());
        assert_eq!(res.next, 80);
        assert_eq!(res.blocks[0].tx_count, 2);
    }

    #[tokio::test]
    async fn refresh_indexes_new_blocks_and_prunes() {
        let store = TxIndex::open_in_memory().unwrap();
        let old = TxDocument {
            signature: "old".into(),
            slot: 100,
            block_time: None,
            fee: None,
            success: true,
            error: None,
            confirmation_status: None,
            signer: None,
            programs: vec![],
        };
        store.insert_many("testnet", vec![old]).await.unwrap();

        let rpc = chain(1_000, 5, &[]);
        let settings = IndexSettings {
            retry: quick_retry(),
            ..IndexSettings::default()
        };
        let outcome = refresh_index(&rpc, &store, "testnet", settings).await.unwrap();
        assert_eq!(
            outcome,
            IndexOutcome::Updated {
                inserted: 10,
                pruned: 1,
                latest_slot: Some(1_000)
            }
        );
        let page = store.page("testnet", 0, 3).await.unwrap();
        assert_eq!(page[0].slot, 1_000);
        assert_eq!(page[0].signer.as_deref(), Some("payer"));

        // the lease was released
        assert!(store
            .try_acquire_lease(&lease_name("testnet"), "next-holder", Duration::from_secs(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn second_refresh_starts_after_last_indexed_slot() {
        let store = TxIndex::open_in_memory().unwrap();
        let settings = IndexSettings {
            retry: quick_retry(),
            ..IndexSettings::default()
        };
        let rpc = chain(500, 3, &[]);
        refresh_index(&rpc, &store, "mainnet-beta", settings).await.unwrap();

        let outcome = refresh_index(&rpc, &store, "mainnet-beta", settings).await.unwrap();
        assert_eq!(
            outcome,
            IndexOutcome::Updated {
                inserted: 0,
                pruned: 0,
                latest_slot: Some(500)
            }
        );
        assert_eq!(rpc.calls_to("getBlocks"), 1);
    }

    #[tokio::test]
    async fn held_lease_means_busy() {
        let store = TxIndex::open_in_memory().unwrap();
        store
            .try_acquire_lease(&lease_name("testnet"), "someone-else", Duration::from_secs(60))
            .await
            .unwrap();
        let rpc = chain(10, 2, &[]);
        let outcome = refresh_index(&rpc, &store, "testnet", IndexSettings::default())
            .await
            .unwrap();
        assert_eq!(outcome, IndexOutcome::Busy);
        assert_eq!(store.count("testnet").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cancelled_refresh_releases_lease() {
        let store = TxIndex::open_in_memory().unwrap();
        let settings = IndexSettings {
            retry: quick_retry(),
            ..IndexSettings::default()
        };
        let mut slow = chain(1_000, 5, &[]);
        slow.latency = Duration::from_secs(60);
        let cancelled = tokio::time::timeout(
            Duration::from_millis(200),
            refresh_index(&slow, &store, "testnet", settings),
        )
        .await;
        assert!(cancelled.is_err());

        let rpc = chain(1_000, 5, &[]);
        let outcome = refresh_index(&rpc, &store, "testnet", settings).await.unwrap();
        assert!(matches!(outcome, IndexOutcome::Updated { inserted: 10, .. }));
    }
}
