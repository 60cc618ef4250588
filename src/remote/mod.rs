//! Remote object store interface
//!
//! The engine only needs two operations from the remote side: an existence
//! lookup returning stored attributes, and a content-checked upload. Uploads
//! are idempotent: re-uploading identical content to an existing object is a
//! no-op that returns the existing checksum, while different content at the
//! same object path is a hard conflict and is never overwritten.

pub mod fs;

use crate::content::Digest;
use crate::error::{RemoteError, RemoteResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use fs::{FsRemote, RemoteStats};

/// Attributes stored alongside every remote object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAttrs {
    /// Object size in bytes
    pub size: u64,
    /// Upper-case hex sample digest attached at upload time
    pub digest: String,
    /// Hex MD5 of the whole object
    pub md5: String,
    /// Storage class the object was written with
    pub storage_class: String,
    /// RFC 3339 upload time
    pub uploaded_at: String,
}

impl ObjectAttrs {
    /// True if this object holds the given content
    pub fn matches(&self, size: u64, digest: &Digest) -> bool {
        self.size == size && self.digest == encode_digest(digest)
    }

    /// Whole-object checksum as bytes
    ///
    /// A value that is not a 16-byte hex MD5 means the attributes of
    /// `object` are corrupt.
    pub fn checksum(&self, object: &str) -> RemoteResult<Vec<u8>> {
        let corrupt = |reason: String| RemoteError::Attributes {
            object: object.to_string(),
            reason,
        };
        let bytes = hex::decode(&self.md5).map_err(|e| corrupt(format!("md5: {e}")))?;
        if bytes.len() != 16 {
            return Err(corrupt(format!("md5 has {} bytes, expected 16", bytes.len())));
        }
        Ok(bytes)
    }
}

/// Outcome of a successful upload call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Remote object path
    pub object: String,
    /// Whole-object checksum
    pub checksum: Vec<u8>,
    /// True if identical content was already present and nothing was sent
    pub reused: bool,
}

/// Content-addressed upload target
pub trait RemoteStore: Send + Sync {
    /// Look up an object's attributes; `None` if it does not exist
    fn exists(&self, object: &str) -> RemoteResult<Option<ObjectAttrs>>;

    /// Upload `local` to `object`
    ///
    /// If the object already exists its size and digest attribute must match
    /// `size` and `digest`: a match returns the existing checksum, a mismatch
    /// fails with `RemoteError::Conflict`.
    fn upload(
        &self,
        local: &Path,
        object: &str,
        size: u64,
        digest: &Digest,
    ) -> RemoteResult<UploadReceipt>;
}

/// Digest encoding used in object attributes
pub fn encode_digest(digest: &Digest) -> String {
    hex::encode_upper(digest)
}

/// Remote object path for a file: `<backup name>/<relative path>`
pub fn object_path(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{prefix}/{relative}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_path() {
        assert_eq!(object_path("photos", "2020/a.jpg"), "photos/2020/a.jpg");
        assert_eq!(object_path("/photos/", "a.jpg"), "photos/a.jpg");
        assert_eq!(object_path("", "a.jpg"), "a.jpg");
    }

    #[test]
    fn test_attrs_match() {
        let digest = [0xAB; 32];
        let attrs = ObjectAttrs {
            size: 5,
            digest: encode_digest(&digest),
            md5: "000102030405060708090a0b0c0d0eff".into(),
            storage_class: "COLDLINE".into(),
            uploaded_at: String::new(),
        };
        assert!(attrs.matches(5, &digest));
        assert!(!attrs.matches(6, &digest));
        assert!(!attrs.matches(5, &[0xAC; 32]));
        let checksum = attrs.checksum("x").unwrap();
        assert_eq!(checksum.len(), 16);
        assert_eq!(checksum[15], 0xFF);
    }

    #[test]
    fn test_malformed_md5_is_corrupt() {
        let mut attrs = ObjectAttrs {
            size: 1,
            digest: encode_digest(&[0; 32]),
            md5: "not hex".into(),
            storage_class: "COLDLINE".into(),
            uploaded_at: String::new(),
        };
        assert!(matches!(
            attrs.checksum("x"),
            Err(RemoteError::Attributes { .. })
        ));

        attrs.md5 = String::new();
        assert!(attrs.checksum("x").is_err());
    }
}
