//! Metadata store schema definitions
//!
//! Defines the column families, content key encoding, and the Entry record
//! stored for each content key.
//!
//! Layout:
//!
//! | Column family      | Key                                   | Value                   |
//! |--------------------|---------------------------------------|-------------------------|
//! | `entries.<name>`   | 8-byte BE size + 32-byte sample hash  | bincode `Entry`         |
//! | `sequences`        | namespace name                        | last assigned id, u64 BE|
//! | `metadata`         | `<name>/<key>`                        | UTF-8 string            |
//!
//! The layout is the only durable state the engine owns and must stay stable
//! across runs.

use crate::content::Digest;
use crate::error::{StoreError, StoreResult};
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Column family prefix for per-namespace entries
pub const CF_ENTRIES_PREFIX: &str = "entries.";
pub const CF_SEQUENCES: &str = "sequences";
pub const CF_METADATA: &str = "metadata";

/// Encoded key length: size (8) + digest (32)
pub const KEY_LEN: usize = 40;

/// Metadata keys
pub mod meta_keys {
    pub const LAST_RUN_START: &str = "last_run_start";
    pub const LAST_RUN_END: &str = "last_run_end";
    pub const LAST_RUN_STATUS: &str = "last_run_status";
    pub const LAST_RUN_SOURCE: &str = "last_run_source";
}

/// Identity of a unit of deduplicated content: exact size plus sample digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentKey {
    pub size: u64,
    pub digest: Digest,
}

impl ContentKey {
    pub fn new(size: u64, digest: Digest) -> Self {
        Self { size, digest }
    }

    /// Encode as a fixed-width 40-byte key (big-endian size for key ordering)
    pub fn encode(&self) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        key[..8].copy_from_slice(&self.size.to_be_bytes());
        key[8..].copy_from_slice(&self.digest);
        key
    }

    /// Decode a key read back from the store
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        if bytes.len() != KEY_LEN {
            return Err(StoreError::InvalidKey(bytes.len()));
        }
        let mut size = [0u8; 8];
        size.copy_from_slice(&bytes[..8]);
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes[8..]);
        Ok(Self {
            size: u64::from_be_bytes(size),
            digest,
        })
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.encode()))
    }
}

/// Entry in the metadata store
///
/// When a file is first observed, `id`, `path`, `size` and `hash` are set.
/// After the content is uploaded, `cloud` and `checksum` are set. Only `path`
/// changes afterwards (when the file moves on disk).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Unique progressive id within the namespace
    pub id: u64,
    /// Path of the file relative to the backup root, `/`-separated
    pub path: String,
    /// Remote object path, empty until uploaded
    pub cloud: String,
    /// Size in bytes
    pub size: u64,
    /// Digest of the content sample
    pub hash: Digest,
    /// Whole-object checksum reported by the remote, empty until uploaded
    pub checksum: Vec<u8>,
}

impl Entry {
    /// A freshly observed entry with no upload state
    pub fn new(id: u64, path: String, key: ContentKey) -> Self {
        Self {
            id,
            path,
            cloud: String::new(),
            size: key.size,
            hash: key.digest,
            checksum: Vec::new(),
        }
    }

    /// Content key this entry is stored under
    pub fn key(&self) -> ContentKey {
        ContentKey::new(self.size, self.hash)
    }

    /// True once the content has been uploaded and acknowledged
    pub fn is_complete(&self) -> bool {
        !self.cloud.is_empty() && !self.checksum.is_empty()
    }

    /// Serialize to bytes using bincode
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Column family name holding a namespace's entries
pub fn entries_cf_name(namespace: &str) -> String {
    format!("{CF_ENTRIES_PREFIX}{namespace}")
}

/// Metadata key scoped to a namespace
pub fn metadata_key(namespace: &str, key: &str) -> Vec<u8> {
    format!("{namespace}/{key}").into_bytes()
}

/// Decode a big-endian u64 value
pub fn decode_u64(bytes: &[u8]) -> Option<u64> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(arr))
}

/// Column family options for entries (point lookups dominate)
fn entries_cf_options() -> Options {
    let mut opts = Options::default();

    // Bloom filter for point lookups (10 bits/key)
    let mut block_opts = rocksdb::BlockBasedOptions::default();
    block_opts.set_bloom_filter(10.0, false);
    block_opts.set_cache_index_and_filter_blocks(true);
    opts.set_block_based_table_factory(&block_opts);

    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    opts
}

/// Column family options for small, infrequently written families
fn small_cf_options() -> Options {
    let mut opts = Options::default();
    opts.set_write_buffer_size(4 * 1024 * 1024);
    opts.set_max_write_buffer_number(2);
    opts
}

/// Database options
pub fn get_db_options() -> Options {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);
    opts.increase_parallelism(num_cpus::get() as i32);
    opts
}

/// Open or create the database, making sure the namespace column family exists
///
/// Column families of other namespaces already present in the database are
/// opened too (RocksDB requires every existing family to be listed).
pub fn open_db<P: AsRef<Path>>(path: P, namespace: &str) -> Result<DB, rocksdb::Error> {
    let path = path.as_ref();
    let db_opts = get_db_options();

    // A missing database has no families yet
    let mut names = DB::list_cf(&db_opts, path).unwrap_or_default();
    for required in [
        rocksdb::DEFAULT_COLUMN_FAMILY_NAME.to_string(),
        CF_SEQUENCES.to_string(),
        CF_METADATA.to_string(),
        entries_cf_name(namespace),
    ] {
        if !names.contains(&required) {
            names.push(required);
        }
    }

    let descriptors = names.into_iter().map(|name| {
        let opts = if name.starts_with(CF_ENTRIES_PREFIX) {
            entries_cf_options()
        } else {
            small_cf_options()
        };
        ColumnFamilyDescriptor::new(name, opts)
    });

    DB::open_cf_descriptors(&db_opts, path, descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> ContentKey {
        let mut digest = [0u8; 32];
        for (i, b) in digest.iter_mut().enumerate() {
            *b = i as u8;
        }
        ContentKey::new(600_000, digest)
    }

    #[test]
    fn test_key_encoding() {
        let key = sample_key();
        let encoded = key.encode();
        assert_eq!(encoded.len(), KEY_LEN);
        assert_eq!(&encoded[..8], &600_000u64.to_be_bytes());
        assert_eq!(ContentKey::decode(&encoded).unwrap(), key);
    }

    #[test]
    fn test_key_order_follows_size() {
        let small = ContentKey::new(10, [0xFF; 32]);
        let large = ContentKey::new(11, [0x00; 32]);
        assert!(small.encode() < large.encode());
        assert!(small < large);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert!(matches!(
            ContentKey::decode(&[0u8; 39]),
            Err(StoreError::InvalidKey(39))
        ));
    }

    #[test]
    fn test_entry_round_trip_incomplete() {
        let entry = Entry::new(7, "music/track.flac".into(), sample_key());
        assert!(!entry.is_complete());

        let decoded = Entry::from_bytes(&entry.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, entry);
        assert!(decoded.cloud.is_empty());
        assert!(decoded.checksum.is_empty());
    }

    #[test]
    fn test_entry_round_trip_complete() {
        let mut entry = Entry::new(42, "photos/2019/img.jpg".into(), sample_key());
        entry.cloud = "backup/photos/2019/img.jpg".into();
        entry.checksum = vec![0xDE, 0xAD, 0xBE, 0xEF];
        assert!(entry.is_complete());

        let decoded = Entry::from_bytes(&entry.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.key(), sample_key());
    }

    #[test]
    fn test_half_uploaded_entry_is_incomplete() {
        let mut entry = Entry::new(1, "a".into(), sample_key());
        entry.cloud = "backup/a".into();
        assert!(!entry.is_complete());
    }

    #[test]
    fn test_content_key_display_is_hex() {
        let shown = sample_key().to_string();
        assert_eq!(shown.len(), KEY_LEN * 2);
        assert!(shown.starts_with("00000000000927C0"));
    }
}
