//! Error types for dedup-backup
//!
//! This module defines the error hierarchy that covers:
//! - Fingerprinting (file open/seek/read) errors
//! - Metadata store (RocksDB) errors
//! - Remote object store errors, including content conflicts
//! - Configuration and CLI errors
//! - Worker thread errors
//!
//! Per-file errors (fingerprint, store transaction, upload) are reported by
//! the worker that hit them and never abort the run. Configuration, store
//! open and remote connect errors are fatal and surface before any work.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the backup engine
#[derive(Error, Debug)]
pub enum BackupError {
    /// Fingerprinting errors
    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),

    /// Metadata store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Remote object store errors
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Traversal failed (directory could not be read)
    #[error("Cannot walk '{path}': {reason}")]
    Walk { path: PathBuf, reason: String },

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors computing a content fingerprint
#[derive(Error, Debug)]
pub enum FingerprintError {
    /// File could not be opened
    #[error("Cannot open '{path}': {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Seek to the sample window failed
    #[error("Cannot seek in '{path}': {source}")]
    Seek {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Reading the sample failed (including a file shorter than announced)
    #[error("Cannot read from '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Metadata store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// RocksDB operation failed
    #[error("RocksDB error: {0}")]
    Rocks(#[from] rocksdb::Error),

    /// Bincode serialization/deserialization error
    #[error("Serialization error: {0}")]
    Bincode(String),

    /// Failed to open or create the database
    #[error("Cannot open store at '{path}': {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    /// Column family for a namespace is missing
    #[error("Namespace column family '{0}' missing")]
    MissingNamespace(String),

    /// No entry for the given content key
    #[error("Cannot find entry with key {0}")]
    KeyNotFound(String),

    /// Stored key has an unexpected shape
    #[error("Invalid key of {0} bytes")]
    InvalidKey(usize),

    /// Sequence counter is corrupt
    #[error("Invalid sequence value for namespace '{0}'")]
    InvalidSequence(String),
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Bincode(e.to_string())
    }
}

/// Remote object store errors
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Object exists remotely with different content
    #[error(
        "Remote object '{object}' already exists, but it's different: {local_size} vs {remote_size} bytes, {local_digest} vs {remote_digest}"
    )]
    Conflict {
        object: String,
        local_size: u64,
        remote_size: u64,
        local_digest: String,
        remote_digest: String,
    },

    /// Object key would escape the bucket or is malformed
    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Bucket could not be provisioned or opened
    #[error("Cannot open bucket '{bucket}': {reason}")]
    Bucket { bucket: String, reason: String },

    /// Stored object attributes are unreadable
    #[error("Corrupt attributes for '{object}': {reason}")]
    Attributes { object: String, reason: String },

    /// Local file changed size while uploading
    #[error("'{path}' changed while uploading: expected {expected} bytes, copied {copied}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        copied: u64,
    },

    /// I/O error talking to the object store
    #[error("I/O error on '{object}': {source}")]
    Io {
        object: String,
        source: std::io::Error,
    },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required setting missing or empty
    #[error("Missing required setting: {hint}")]
    Missing { hint: &'static str },

    /// Invalid worker count
    #[error("Invalid thread count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid sample size
    #[error("Invalid sample size {size}: must be at least {min} bytes")]
    InvalidSampleSize { size: u64, min: u64 },

    /// Source directory does not exist or is not a directory
    #[error("Invalid source directory '{path}': {reason}")]
    InvalidSourceDir { path: PathBuf, reason: String },

    /// Store path cannot be used
    #[error("Invalid store path '{path}': {reason}")]
    InvalidStorePath { path: PathBuf, reason: String },

    /// Backup name cannot be used as a namespace
    #[error("Invalid backup name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker could not be spawned
    #[error("Failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// Work queue closed while traversal was still pushing
    #[error("Work queue closed unexpectedly")]
    QueueClosed,
}

/// Result type alias for BackupError
pub type Result<T> = std::result::Result<T, BackupError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for RemoteError
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
