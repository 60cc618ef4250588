//! End-of-run reconciliation
//!
//! Every entry whose id was not touched during the run is content the store
//! knows about but the tree no longer holds (deleted, or changed so that its
//! key changed). Such entries are only reported; nothing is deleted.

use crate::dedup::TouchedSet;
use crate::error::StoreResult;
use crate::store::MetadataStore;
use tracing::warn;

/// An entry not observed during the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingEntry {
    pub id: u64,
    pub path: String,
    /// Upper-case hex of the encoded content key
    pub key: String,
}

/// Collect every entry whose id is not in `touched`, in key order
pub fn find_missing(
    store: &MetadataStore,
    touched: &TouchedSet,
) -> StoreResult<Vec<MissingEntry>> {
    let touched = touched.snapshot();
    let mut missing = Vec::new();

    store.for_each_entry(|key, entry| match entry {
        Ok(entry) if !touched.contains(&entry.id) => missing.push(MissingEntry {
            id: entry.id,
            path: entry.path,
            key: hex::encode_upper(key),
        }),
        Ok(_) => {}
        Err(e) => warn!(key = %hex::encode_upper(key), error = %e, "Cannot decode entry"),
    })?;

    Ok(missing)
}

/// Log one line per missing entry
pub fn log_missing(missing: &[MissingEntry]) {
    for entry in missing {
        warn!(id = entry.id, path = %entry.path, key = %entry.key, "File is missing");
    }
}
