//! Directory-backed object store
//!
//! Emulates a cloud bucket on a local or mounted filesystem:
//!
//! ```text
//! <root>/<project>/<bucket>/
//! ├── objects/<object path>         object bytes
//! └── attrs/<object path>.json      ObjectAttrs (size, digest, md5, ...)
//! ```
//!
//! An object exists once its attributes file exists. Object bytes are
//! written to a temp file and renamed into place, then the attributes are
//! written the same way, so an interrupted upload leaves at most orphaned
//! bytes that the next upload of that object overwrites.

use crate::content::Digest;
use crate::error::{RemoteError, RemoteResult};
use crate::remote::{encode_digest, ObjectAttrs, RemoteStore, UploadReceipt};
use chrono::Utc;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Copy buffer size for uploads
const CHUNK_SIZE: usize = 1024 * 1024;

/// Storage class recorded for new objects
pub const DEFAULT_STORAGE_CLASS: &str = "COLDLINE";

const OBJECTS_DIR: &str = "objects";
const ATTRS_DIR: &str = "attrs";
const ATTRS_SUFFIX: &str = ".json";

/// Upload counters
#[derive(Debug, Default)]
pub struct RemoteStats {
    /// Objects written
    pub uploaded: AtomicU64,

    /// Uploads satisfied by an identical existing object
    pub reused: AtomicU64,

    /// Bytes written
    pub bytes_uploaded: AtomicU64,
}

impl RemoteStats {
    pub fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::Relaxed)
    }

    pub fn reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded.load(Ordering::Relaxed)
    }
}

/// Bucket directory on a filesystem
pub struct FsRemote {
    bucket_dir: PathBuf,
    bucket: String,
    storage_class: String,
    stats: RemoteStats,
}

impl FsRemote {
    /// Open the bucket `<root>/<project>/<bucket>`, creating it if missing
    pub fn connect(root: &Path, project: &str, bucket: &str) -> RemoteResult<Self> {
        for (what, name) in [("project", project), ("bucket", bucket)] {
            if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(RemoteError::Bucket {
                    bucket: bucket.to_string(),
                    reason: format!("invalid {what} name '{name}'"),
                });
            }
        }

        let bucket_dir = root.join(project).join(bucket);
        let bucket_err = |e: io::Error| RemoteError::Bucket {
            bucket: bucket.to_string(),
            reason: e.to_string(),
        };

        if bucket_dir.is_dir() {
            info!(
                bucket,
                location = %bucket_dir.display(),
                storage_class = DEFAULT_STORAGE_CLASS,
                "Using existing bucket"
            );
        } else {
            fs::create_dir_all(&bucket_dir).map_err(bucket_err)?;
            info!(bucket, location = %bucket_dir.display(), "Created bucket");
        }
        fs::create_dir_all(bucket_dir.join(OBJECTS_DIR)).map_err(bucket_err)?;
        fs::create_dir_all(bucket_dir.join(ATTRS_DIR)).map_err(bucket_err)?;

        Ok(Self {
            bucket_dir,
            bucket: bucket.to_string(),
            storage_class: DEFAULT_STORAGE_CLASS.to_string(),
            stats: RemoteStats::default(),
        })
    }

    /// Bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload counters
    pub fn stats(&self) -> &RemoteStats {
        &self.stats
    }

    /// Reject object keys that could escape the bucket
    fn validate_key(key: &str) -> RemoteResult<()> {
        let invalid = |reason: &str| RemoteError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        if key.is_empty() {
            return Err(invalid("empty"));
        }
        if key.starts_with('/') || key.starts_with('\\') {
            return Err(invalid("absolute path"));
        }
        if key.contains('\\') {
            return Err(invalid("contains backslash"));
        }
        for component in Path::new(key).components() {
            match component {
                Component::Normal(_) => {}
                Component::CurDir => return Err(invalid("current-directory component")),
                _ => return Err(invalid("parent traversal")),
            }
        }
        Ok(())
    }

    fn object_file(&self, key: &str) -> PathBuf {
        self.bucket_dir.join(OBJECTS_DIR).join(key)
    }

    fn attrs_file(&self, key: &str) -> PathBuf {
        self.bucket_dir
            .join(ATTRS_DIR)
            .join(format!("{key}{ATTRS_SUFFIX}"))
    }

    /// Create a temp file next to `path`, creating parent directories
    fn temp_beside(&self, path: &Path, object: &str) -> RemoteResult<NamedTempFile> {
        let dir = path.parent().unwrap_or(&self.bucket_dir);
        fs::create_dir_all(dir).map_err(|source| RemoteError::Io {
            object: object.to_string(),
            source,
        })?;
        NamedTempFile::new_in(dir).map_err(|source| RemoteError::Io {
            object: object.to_string(),
            source,
        })
    }

    /// Stream `local` into a temp object, returning (temp, bytes, md5)
    fn copy_object(
        &self,
        local: &Path,
        object: &str,
    ) -> RemoteResult<(NamedTempFile, u64, md5::Digest)> {
        let io_err = |source| RemoteError::Io {
            object: object.to_string(),
            source,
        };

        let mut input = File::open(local).map_err(io_err)?;
        let mut tmp = self.temp_beside(&self.object_file(object), object)?;
        let mut hasher = md5::Context::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut copied = 0u64;

        loop {
            let n = input.read(&mut buffer).map_err(io_err)?;
            if n == 0 {
                break;
            }
            hasher.consume(&buffer[..n]);
            tmp.write_all(&buffer[..n]).map_err(io_err)?;
            copied += n as u64;
        }
        tmp.as_file().sync_all().map_err(io_err)?;

        Ok((tmp, copied, hasher.compute()))
    }

    fn write_attrs(&self, object: &str, attrs: &ObjectAttrs) -> RemoteResult<()> {
        let path = self.attrs_file(object);
        let body = serde_json::to_vec_pretty(attrs).map_err(|e| RemoteError::Attributes {
            object: object.to_string(),
            reason: e.to_string(),
        })?;

        let mut tmp = self.temp_beside(&path, object)?;
        tmp.write_all(&body).map_err(|source| RemoteError::Io {
            object: object.to_string(),
            source,
        })?;
        tmp.persist(&path).map_err(|e| RemoteError::Io {
            object: object.to_string(),
            source: e.error,
        })?;
        Ok(())
    }
}

impl RemoteStore for FsRemote {
    fn exists(&self, object: &str) -> RemoteResult<Option<ObjectAttrs>> {
        Self::validate_key(object)?;
        let body = match fs::read(self.attrs_file(object)) {
            Ok(body) => body,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(RemoteError::Io {
                    object: object.to_string(),
                    source,
                })
            }
        };

        let attrs = serde_json::from_slice(&body).map_err(|e| RemoteError::Attributes {
            object: object.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(attrs))
    }

    fn upload(
        &self,
        local: &Path,
        object: &str,
        size: u64,
        digest: &Digest,
    ) -> RemoteResult<UploadReceipt> {
        if let Some(attrs) = self.exists(object)? {
            if attrs.matches(size, digest) {
                let checksum = attrs.checksum(object)?;
                debug!(object, "Identical object already present");
                self.stats.reused.fetch_add(1, Ordering::Relaxed);
                return Ok(UploadReceipt {
                    object: object.to_string(),
                    checksum,
                    reused: true,
                });
            }
            return Err(RemoteError::Conflict {
                object: object.to_string(),
                local_size: size,
                remote_size: attrs.size,
                local_digest: encode_digest(digest),
                remote_digest: attrs.digest,
            });
        }

        let (tmp, copied, md5) = self.copy_object(local, object)?;
        if copied != size {
            return Err(RemoteError::SizeMismatch {
                path: local.to_path_buf(),
                expected: size,
                copied,
            });
        }

        tmp.persist(self.object_file(object))
            .map_err(|e| RemoteError::Io {
                object: object.to_string(),
                source: e.error,
            })?;

        let attrs = ObjectAttrs {
            size,
            digest: encode_digest(digest),
            md5: format!("{md5:x}"),
            storage_class: self.storage_class.clone(),
            uploaded_at: Utc::now().to_rfc3339(),
        };
        self.write_attrs(object, &attrs)?;

        self.stats.uploaded.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes_uploaded.fetch_add(size, Ordering::Relaxed);

        Ok(UploadReceipt {
            object: object.to_string(),
            checksum: md5.0.to_vec(),
            reused: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_local(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_connect_creates_bucket() {
        let root = tempdir().unwrap();
        let remote = FsRemote::connect(root.path(), "proj", "bkt").unwrap();
        assert_eq!(remote.bucket(), "bkt");
        assert!(root.path().join("proj/bkt/objects").is_dir());
        assert!(root.path().join("proj/bkt/attrs").is_dir());

        // Reconnecting to an existing bucket is fine
        FsRemote::connect(root.path(), "proj", "bkt").unwrap();
    }

    #[test]
    fn test_connect_rejects_bad_names() {
        let root = tempdir().unwrap();
        assert!(FsRemote::connect(root.path(), "", "bkt").is_err());
        assert!(FsRemote::connect(root.path(), "proj", "a/b").is_err());
        assert!(FsRemote::connect(root.path(), "proj", "..").is_err());
    }

    #[test]
    fn test_upload_then_exists() {
        let root = tempdir().unwrap();
        let src = tempdir().unwrap();
        let remote = FsRemote::connect(root.path(), "p", "b").unwrap();
        let local = write_local(src.path(), "f.txt", b"hello object");

        assert_eq!(remote.exists("backup/f.txt").unwrap(), None);

        let receipt = remote.upload(&local, "backup/f.txt", 12, &[1; 32]).unwrap();
        assert!(!receipt.reused);
        assert_eq!(receipt.object, "backup/f.txt");
        assert_eq!(receipt.checksum, md5::compute(b"hello object").0.to_vec());

        let attrs = remote.exists("backup/f.txt").unwrap().unwrap();
        assert_eq!(attrs.size, 12);
        assert_eq!(attrs.storage_class, DEFAULT_STORAGE_CLASS);
        assert!(attrs.matches(12, &[1; 32]));

        let stored = fs::read(root.path().join("p/b/objects/backup/f.txt")).unwrap();
        assert_eq!(stored, b"hello object");
        assert_eq!(remote.stats().uploaded(), 1);
        assert_eq!(remote.stats().bytes_uploaded(), 12);
    }

    #[test]
    fn test_identical_reupload_is_noop() {
        let root = tempdir().unwrap();
        let src = tempdir().unwrap();
        let remote = FsRemote::connect(root.path(), "p", "b").unwrap();
        let local = write_local(src.path(), "f", b"same");

        let first = remote.upload(&local, "x/f", 4, &[2; 32]).unwrap();
        let second = remote.upload(&local, "x/f", 4, &[2; 32]).unwrap();
        assert!(second.reused);
        assert_eq!(first.checksum, second.checksum);
        assert_eq!(remote.stats().uploaded(), 1);
        assert_eq!(remote.stats().reused(), 1);
    }

    #[test]
    fn test_corrupt_md5_attribute_fails_reupload() {
        let root = tempdir().unwrap();
        let src = tempdir().unwrap();
        let remote = FsRemote::connect(root.path(), "p", "b").unwrap();
        let local = write_local(src.path(), "f", b"same");
        remote.upload(&local, "x/f", 4, &[6; 32]).unwrap();

        let attrs_path = root.path().join("p/b/attrs/x/f.json");
        let mut attrs: ObjectAttrs =
            serde_json::from_slice(&fs::read(&attrs_path).unwrap()).unwrap();
        attrs.md5 = "zz".into();
        fs::write(&attrs_path, serde_json::to_vec(&attrs).unwrap()).unwrap();

        let err = remote.upload(&local, "x/f", 4, &[6; 32]).unwrap_err();
        assert!(matches!(err, RemoteError::Attributes { .. }));
        assert_eq!(remote.stats().reused(), 0);
    }

    #[test]
    fn test_different_content_conflicts() {
        let root = tempdir().unwrap();
        let src = tempdir().unwrap();
        let remote = FsRemote::connect(root.path(), "p", "b").unwrap();
        let a = write_local(src.path(), "a", b"first");
        let b = write_local(src.path(), "b", b"other");

        remote.upload(&a, "x/f", 5, &[3; 32]).unwrap();
        let err = remote.upload(&b, "x/f", 5, &[4; 32]).unwrap_err();
        assert!(matches!(err, RemoteError::Conflict { .. }));

        // Never overwritten
        let stored = fs::read(root.path().join("p/b/objects/x/f")).unwrap();
        assert_eq!(stored, b"first");
    }

    #[test]
    fn test_size_change_during_upload_is_rejected() {
        let root = tempdir().unwrap();
        let src = tempdir().unwrap();
        let remote = FsRemote::connect(root.path(), "p", "b").unwrap();
        let local = write_local(src.path(), "grew", b"longer than announced");

        let err = remote.upload(&local, "x/grew", 3, &[5; 32]).unwrap_err();
        assert!(matches!(err, RemoteError::SizeMismatch { .. }));
        assert_eq!(remote.exists("x/grew").unwrap(), None);
    }

    #[test]
    fn test_validate_key() {
        assert!(FsRemote::validate_key("a/b/c.jpg").is_ok());
        assert!(FsRemote::validate_key("").is_err());
        assert!(FsRemote::validate_key("/etc/passwd").is_err());
        assert!(FsRemote::validate_key("a/../../b").is_err());
        assert!(FsRemote::validate_key("a\\b").is_err());
        assert!(FsRemote::validate_key("./a").is_err());
    }
}
