//! Per-file dedup decisions
//!
//! Every regular file found by traversal goes through [`DedupEngine::process`]:
//!
//! 1. fingerprint the file into a content key
//! 2. admit the key into the metadata store (create or find) and mark the
//!    entry id as touched for this run, in one store transaction
//! 3. decide:
//!    - an id already touched this run is a duplicate, whatever its state
//!    - a new or incomplete entry is uploaded and gets cloud + checksum
//!    - a complete entry under a different path is a rename
//!    - otherwise nothing changed
//!
//! Because the touched mark is taken together with the lookup, exactly one
//! file per content key per run sees the id untouched. Only that file may
//! upload, so identical files found concurrently never both upload.

pub mod touched;

pub use touched::TouchedSet;

use crate::content::{fingerprint, Digest, SampleWindow};
use crate::error::Result;
use crate::remote::{object_path, RemoteStore};
use crate::store::{ContentKey, EntryState, MetadataStore};
use crate::walker::WorkItem;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Same content as another file already seen this run
    Duplicate { of: String },

    /// Content uploaded (or found identical on the remote) and recorded
    Uploaded {
        /// Entry existed but had never been uploaded
        resumed: bool,
        /// Remote already held identical content
        reused: bool,
        bytes: u64,
    },

    /// Known content found under a new path; stored path updated
    Renamed { from: String },

    /// Known content at its known path
    Unchanged,
}

/// Decision engine shared by all workers
pub struct DedupEngine {
    store: Arc<MetadataStore>,
    remote: Arc<dyn RemoteStore>,
    touched: Arc<TouchedSet>,
    /// Remote object prefix (the backup name)
    prefix: String,
    window: SampleWindow,
}

impl DedupEngine {
    pub fn new(
        store: Arc<MetadataStore>,
        remote: Arc<dyn RemoteStore>,
        touched: Arc<TouchedSet>,
        prefix: impl Into<String>,
        window: SampleWindow,
    ) -> Self {
        Self {
            store,
            remote,
            touched,
            prefix: prefix.into(),
            window,
        }
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Classify one file and apply the resulting store/remote changes
    ///
    /// Failures are logged here with the file's path, and its content key
    /// once known, before being returned.
    pub fn process(&self, item: &WorkItem) -> Result<FileOutcome> {
        let digest = match fingerprint(&item.path, item.size, self.window) {
            Ok(digest) => digest,
            Err(e) => {
                warn!(
                    path = %item.relative,
                    size = item.size,
                    error = %e,
                    "Cannot fingerprint file"
                );
                return Err(e.into());
            }
        };
        let key = ContentKey::new(item.size, digest);

        match self.apply(item, key, &digest) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(path = %item.relative, %key, error = %e, "Cannot back up file");
                Err(e)
            }
        }
    }

    fn apply(&self, item: &WorkItem, key: ContentKey, digest: &Digest) -> Result<FileOutcome> {
        let admission = self
            .store
            .add_if_absent_and_mark(&item.relative, key, &self.touched)?;

        if admission.already_touched {
            info!(
                path = %item.relative,
                original = %admission.stored_path,
                "File is likely a duplicate"
            );
            return Ok(FileOutcome::Duplicate {
                of: admission.stored_path,
            });
        }

        if admission.needs_upload() {
            let resumed = admission.state == EntryState::Incomplete;
            let object = object_path(&self.prefix, &item.relative);

            let receipt = self.remote.upload(&item.path, &object, item.size, digest)?;
            self.store.update_by_key(key, |entry| {
                entry.set_cloud(receipt.object.clone());
                entry.set_checksum(receipt.checksum.clone());
            })?;

            info!(
                path = %item.relative,
                id = admission.id,
                object = %receipt.object,
                resumed,
                "Uploaded"
            );
            return Ok(FileOutcome::Uploaded {
                resumed,
                reused: receipt.reused,
                bytes: if receipt.reused { 0 } else { item.size },
            });
        }

        if admission.stored_path != item.relative {
            self.store
                .update_by_key(key, |entry| entry.set_path(item.relative.clone()))?;
            info!(
                from = %admission.stored_path,
                to = %item.relative,
                "File has been renamed"
            );
            return Ok(FileOutcome::Renamed {
                from: admission.stored_path,
            });
        }

        debug!(path = %item.relative, %key, "Unchanged");
        Ok(FileOutcome::Unchanged)
    }
}
