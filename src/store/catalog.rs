//! Content-addressed metadata store
//!
//! One RocksDB database holds any number of backup namespaces. Each
//! namespace maps content keys to `Entry` records and owns a monotonically
//! increasing id sequence.
//!
//! All writes go through a single store-wide lock, so every check-and-create
//! and every field update is one serialized transaction. Reads (iteration)
//! run against RocksDB snapshots and do not take the lock.
//!
//! During a run, admission also marks the entry id in the run's touched set
//! inside the same critical section. Exactly one caller per run sees an id
//! untouched, and only that caller may upload the content. Nothing about
//! this is persisted: a crash simply leaves the entry incomplete, to be
//! retried on the next run.

use crate::dedup::TouchedSet;
use crate::error::{StoreError, StoreResult};
use crate::store::schema::{
    decode_u64, entries_cf_name, meta_keys, metadata_key, open_db, ContentKey, Entry,
    CF_METADATA, CF_SEQUENCES,
};
use chrono::Utc;
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, IteratorMode, WriteBatch, DB};
use std::path::Path;
use tracing::{debug, info};

/// Upload state of a key as seen by `add_if_absent`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Key was absent; a new entry was just created
    Created,
    /// Entry existed but was never successfully uploaded
    Incomplete,
    /// Entry existed and is uploaded
    Complete,
}

impl EntryState {
    /// True for new or incomplete entries (upload candidates)
    pub fn needs_upload(self) -> bool {
        !matches!(self, EntryState::Complete)
    }
}

/// Result of admitting a file's content key into the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Id of the entry owning the key
    pub id: u64,
    /// Path stored for the key (the first path, or the last renamed-to path)
    pub stored_path: String,
    /// Upload state at admission time
    pub state: EntryState,
    /// Id had already been marked in the run's touched set
    pub already_touched: bool,
}

impl Admission {
    pub fn needs_upload(&self) -> bool {
        self.state.needs_upload()
    }

    /// First sighting this run of content that still has to be uploaded
    pub fn owns_upload(&self) -> bool {
        !self.already_touched && self.needs_upload()
    }
}

/// Mutable view of an entry handed to `update_by_key`
///
/// Only `path`, `cloud` and `checksum` may change; id, size and hash are
/// fixed once assigned.
pub struct EntryUpdate<'a> {
    entry: &'a mut Entry,
}

impl EntryUpdate<'_> {
    pub fn id(&self) -> u64 {
        self.entry.id
    }

    pub fn path(&self) -> &str {
        &self.entry.path
    }

    pub fn cloud(&self) -> &str {
        &self.entry.cloud
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.entry.path = path.into();
    }

    pub fn set_cloud(&mut self, cloud: impl Into<String>) {
        self.entry.cloud = cloud.into();
    }

    pub fn set_checksum(&mut self, checksum: Vec<u8>) {
        self.entry.checksum = checksum;
    }
}

/// Durable content key → entry mapping for one backup namespace
pub struct MetadataStore {
    db: DB,
    namespace: String,
    entries_cf: String,
    /// Serializes every write transaction
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl MetadataStore {
    /// Open or create the store at `path` with the given namespace
    pub fn open<P: AsRef<Path>>(path: P, namespace: &str) -> StoreResult<Self> {
        let path = path.as_ref();
        let db = open_db(path, namespace).map_err(|e| StoreError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let store = Self {
            db,
            namespace: namespace.to_string(),
            entries_cf: entries_cf_name(namespace),
            write_lock: Mutex::new(()),
        };
        // Fail fast if the family somehow did not get created
        store.cf_entries()?;

        info!(path = %path.display(), namespace, "Metadata store opened");
        Ok(store)
    }

    /// Namespace this store operates on
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn cf_entries(&self) -> StoreResult<&ColumnFamily> {
        self.db
            .cf_handle(&self.entries_cf)
            .ok_or_else(|| StoreError::MissingNamespace(self.entries_cf.clone()))
    }

    fn cf_sequences(&self) -> StoreResult<&ColumnFamily> {
        self.db
            .cf_handle(CF_SEQUENCES)
            .ok_or_else(|| StoreError::MissingNamespace(CF_SEQUENCES.to_string()))
    }

    fn cf_metadata(&self) -> StoreResult<&ColumnFamily> {
        self.db
            .cf_handle(CF_METADATA)
            .ok_or_else(|| StoreError::MissingNamespace(CF_METADATA.to_string()))
    }

    /// Read the entry for a key, if any
    pub fn entry(&self, key: &ContentKey) -> StoreResult<Option<Entry>> {
        match self.db.get_cf(self.cf_entries()?, key.encode())? {
            Some(bytes) => Ok(Some(Entry::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Last id handed out in this namespace (0 when none)
    pub fn last_id(&self) -> StoreResult<u64> {
        match self
            .db
            .get_cf(self.cf_sequences()?, self.namespace.as_bytes())?
        {
            Some(bytes) => decode_u64(&bytes)
                .ok_or_else(|| StoreError::InvalidSequence(self.namespace.clone())),
            None => Ok(0),
        }
    }

    /// Atomically look up `key`, creating an entry for `path` if absent
    ///
    /// Existing entries are returned untouched with their id and stored path.
    /// New entries get the next sequence id and empty upload fields; the entry
    /// and the sequence bump are committed in one batch.
    pub fn add_if_absent(&self, path: &str, key: ContentKey) -> StoreResult<Admission> {
        let _guard = self.write_lock.lock();
        self.admit_locked(path, key, None)
    }

    /// `add_if_absent`, also marking the entry id in `touched`
    ///
    /// The mark happens in the same transaction as the lookup, so of all
    /// callers admitting the same key during a run exactly one sees
    /// `already_touched == false`.
    pub fn add_if_absent_and_mark(
        &self,
        path: &str,
        key: ContentKey,
        touched: &TouchedSet,
    ) -> StoreResult<Admission> {
        let _guard = self.write_lock.lock();
        self.admit_locked(path, key, Some(touched))
    }

    fn admit_locked(
        &self,
        path: &str,
        key: ContentKey,
        touched: Option<&TouchedSet>,
    ) -> StoreResult<Admission> {
        let cf = self.cf_entries()?;
        let encoded = key.encode();

        let (id, stored_path, state) = match self.db.get_cf(cf, encoded)? {
            Some(bytes) => {
                let entry = Entry::from_bytes(&bytes)?;
                let state = if entry.is_complete() {
                    EntryState::Complete
                } else {
                    EntryState::Incomplete
                };
                (entry.id, entry.path, state)
            }
            None => {
                let id = self.last_id()? + 1;
                let entry = Entry::new(id, path.to_string(), key);

                let mut batch = WriteBatch::default();
                batch.put_cf(cf, encoded, entry.to_bytes()?);
                batch.put_cf(self.cf_sequences()?, self.namespace.as_bytes(), id.to_be_bytes());
                self.db.write(batch)?;

                debug!(id, path, %key, "Entry created");
                (id, entry.path, EntryState::Created)
            }
        };

        let already_touched = touched.is_some_and(|t| t.mark(id));

        Ok(Admission {
            id,
            stored_path,
            state,
            already_touched,
        })
    }

    /// Atomically apply `mutate` to the entry stored under `key`
    ///
    /// Fails with `KeyNotFound` if the key does not exist.
    pub fn update_by_key<F>(&self, key: ContentKey, mutate: F) -> StoreResult<Entry>
    where
        F: FnOnce(&mut EntryUpdate<'_>),
    {
        let _guard = self.write_lock.lock();
        let cf = self.cf_entries()?;
        let encoded = key.encode();

        let bytes = self
            .db
            .get_cf(cf, encoded)?
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))?;
        let mut entry = Entry::from_bytes(&bytes)?;

        mutate(&mut EntryUpdate { entry: &mut entry });

        self.db.put_cf(cf, encoded, entry.to_bytes()?)?;
        Ok(entry)
    }

    /// Visit every entry in key order over a consistent snapshot
    ///
    /// Entries that fail to decode are handed to the visitor as errors so
    /// one corrupt record does not hide the rest.
    pub fn for_each_entry<F>(&self, mut visit: F) -> StoreResult<()>
    where
        F: FnMut(&[u8], StoreResult<Entry>),
    {
        let cf = self.cf_entries()?;
        let snapshot = self.db.snapshot();
        for item in snapshot.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            visit(&key[..], Entry::from_bytes(&value));
        }
        Ok(())
    }

    /// Number of entries in the namespace (O(n))
    pub fn count_entries(&self) -> StoreResult<u64> {
        let mut count = 0u64;
        self.for_each_entry(|_, _| count += 1)?;
        Ok(count)
    }

    /// Set a namespace-scoped metadata value
    pub fn set_metadata(&self, key: &str, value: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        self.db.put_cf(
            self.cf_metadata()?,
            metadata_key(&self.namespace, key),
            value.as_bytes(),
        )?;
        Ok(())
    }

    /// Get a namespace-scoped metadata value
    pub fn get_metadata(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .db
            .get_cf(self.cf_metadata()?, metadata_key(&self.namespace, key))?;
        Ok(value.map(|bytes| String::from_utf8_lossy(&bytes).to_string()))
    }

    /// Record the start of a backup run over `source`
    pub fn record_run_start(&self, source: &str) -> StoreResult<()> {
        self.set_metadata(meta_keys::LAST_RUN_START, &Utc::now().to_rfc3339())?;
        self.set_metadata(meta_keys::LAST_RUN_SOURCE, source)?;
        self.set_metadata(meta_keys::LAST_RUN_STATUS, "running")
    }

    /// Record the end of a backup run and its final status
    pub fn record_run_end(&self, status: &str) -> StoreResult<()> {
        self.set_metadata(meta_keys::LAST_RUN_END, &Utc::now().to_rfc3339())?;
        self.set_metadata(meta_keys::LAST_RUN_STATUS, status)
    }

    /// Flush memtables to disk
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush_cf(self.cf_entries()?)?;
        Ok(())
    }
}
