//! Store statistics
//!
//! Compute summary statistics for a namespace directly from the store.

use crate::error::StoreResult;
use crate::store::catalog::MetadataStore;
use crate::store::schema::meta_keys;
use tracing::warn;

/// Overall namespace statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total_entries: u64,
    pub complete: u64,
    pub incomplete: u64,
    pub corrupt: u64,
    pub total_bytes: u64,
    pub pending_bytes: u64,
    pub last_id: u64,
    pub last_run_start: Option<String>,
    pub last_run_end: Option<String>,
    pub last_run_status: Option<String>,
    pub last_run_source: Option<String>,
}

/// Compute statistics for the store's namespace
pub fn compute_stats(store: &MetadataStore) -> StoreResult<StoreStats> {
    let mut stats = StoreStats::default();

    store.for_each_entry(|key, entry| {
        stats.total_entries += 1;
        match entry {
            Ok(entry) => {
                stats.total_bytes += entry.size;
                if entry.is_complete() {
                    stats.complete += 1;
                } else {
                    stats.incomplete += 1;
                    stats.pending_bytes += entry.size;
                }
            }
            Err(e) => {
                warn!(key = %hex::encode_upper(key), error = %e, "Cannot decode entry");
                stats.corrupt += 1;
            }
        }
    })?;

    stats.last_id = store.last_id()?;
    stats.last_run_start = store.get_metadata(meta_keys::LAST_RUN_START)?;
    stats.last_run_end = store.get_metadata(meta_keys::LAST_RUN_END)?;
    stats.last_run_status = store.get_metadata(meta_keys::LAST_RUN_STATUS)?;
    stats.last_run_source = store.get_metadata(meta_keys::LAST_RUN_SOURCE)?;

    Ok(stats)
}
