//! dedup-backup - deduplicating directory backup
//!
//! Walks a local directory tree, identifies each file by its size plus the
//! SHA-256 of a bounded sample, and uploads content never seen before to an
//! object store. A local RocksDB store remembers every piece of content and
//! where it was uploaded, so re-runs over a large, mostly static tree only
//! pay for what changed.
//!
//! # Features
//!
//! - **Sampled Fingerprints**: at most 128,000 bytes are read per file, taken
//!   from the middle of the file. Per-file cost does not grow with file size.
//!
//! - **Content-Addressed Store**: one entry per content key, with a stable
//!   id, the current path, and the remote object and checksum once uploaded.
//!
//! - **Parallel Workers**: a bounded queue feeds a pool of OS threads; the
//!   queue bound keeps memory flat on arbitrarily large trees.
//!
//! - **Exactly-Once Uploads**: duplicates, renames and interrupted uploads
//!   are detected; no content is uploaded twice in a run.
//!
//! # Architecture
//!
//! ```text
//!        ┌──────────────────────┐
//!        │  traversal (walkdir) │
//!        └──────────┬───────────┘
//!                   │ WorkItem { path, size }
//!                   ▼
//!        ┌──────────────────────┐
//!        │  bounded work queue  │
//!        │ (crossbeam, 2 × N)   │
//!        └──────────┬───────────┘
//!                   ▼
//!   ┌───────────────────────────────┐        ┌──────────────────┐
//!   │ Worker 1 .. Worker N          │        │  MetadataStore   │
//!   │  fingerprint → admit + mark  ─┼───────►│  (RocksDB)       │
//!   │  → decide                     │        └──────────────────┘
//!   │  → upload / rename / skip    ─┼───────►┌──────────────────┐
//!   └───────────────────────────────┘        │  RemoteStore     │
//!                                            └──────────────────┘
//! ```
//!
//! After the walk, every stored entry not touched during the run is
//! reported as missing.
//!
//! # Example
//!
//! ```bash
//! dedup-backup --db backup.rocks --name photos --dir /srv/photos \
//!     --project-id home --bucket archive --remote-root /mnt/cold
//!
//! dedup-backup stats --db backup.rocks --name photos
//! ```

pub mod config;
pub mod content;
pub mod dedup;
pub mod error;
pub mod progress;
pub mod remote;
pub mod report;
pub mod store;
pub mod walker;

pub use config::{BackupConfig, CliArgs};
pub use dedup::{DedupEngine, FileOutcome, TouchedSet};
pub use error::{BackupError, Result};
pub use remote::{FsRemote, RemoteStore};
pub use report::{find_missing, MissingEntry};
pub use store::{ContentKey, Entry, MetadataStore};
pub use walker::{BackupCoordinator, RunProgress, RunResult};
