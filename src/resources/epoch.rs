use crate::cache::CacheEntry;
use crate::error::FetchResult;
use crate::resource::{FetchScope, Resource};
use crate::rpc::ChainRpc;
use crate::types::{EpochInfo, EpochSchedule};
use serde::Serialize;

pub const KEY: &str = "epoch";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochSnapshot {
    pub info: EpochInfo,
    pub schedule: EpochSchedule,
    pub first_slot: u64,
    pub last_slot: u64,
    /// Fraction of the epoch already elapsed, 0.0..=1.0
    pub progress: f64,
}

pub async fn load(rpc: &dyn ChainRpc) -> FetchResult<EpochSnapshot> {
    let (info, schedule) = tokio::try_join!(rpc.get_epoch_info(), rpc.get_epoch_schedule())?;
    let first_slot = info.absolute_slot.saturating_sub(info.slot_index);
    let last_slot = first_slot + info.slots_in_epoch.saturating_sub(1);
    let progress = if info.slots_in_epoch == 0 {
        0.0
    } else {
        (info.slot_index as f64 / info.slots_in_epoch as f64).min(1.0)
    };
    Ok(EpochSnapshot {
        info,
        schedule,
        first_slot,
        last_slot,
        progress,
    })
}

pub async fn fetch(
    resource: &Resource<EpochSnapshot>,
    scope: &FetchScope,
    rpc: &dyn ChainRpc,
) -> Option<CacheEntry<EpochSnapshot>> {
    resource.fetch(scope, KEY, load(rpc)).await
}
