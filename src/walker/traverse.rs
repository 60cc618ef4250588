//! Depth-first traversal feeding the work queue
//!
//! Runs on the coordinator thread. Entries are visited in file-name order so
//! that, within a run, the first of several identical files is always the
//! same one.

use crate::config::BackupConfig;
use crate::error::{BackupError, Result};
use crate::walker::queue::{WorkItem, WorkQueueSender};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// Traversal counters
#[derive(Debug, Default)]
pub struct TraverseStats {
    /// Directories entered
    pub dirs: AtomicU64,

    /// Files pushed to the queue
    pub files_queued: AtomicU64,

    /// Sum of queued file sizes
    pub bytes_queued: AtomicU64,

    /// Directories pruned by name
    pub skipped_dirs: AtomicU64,

    /// Files ignored by suffix
    pub skipped_files: AtomicU64,

    /// Zero-byte files
    pub empty_files: AtomicU64,

    /// Symlinks, sockets, devices, ...
    pub non_regular: AtomicU64,
}

impl TraverseStats {
    pub fn files_queued(&self) -> u64 {
        self.files_queued.load(Ordering::Relaxed)
    }

    pub fn bytes_queued(&self) -> u64 {
        self.bytes_queued.load(Ordering::Relaxed)
    }

    pub fn dirs(&self) -> u64 {
        self.dirs.load(Ordering::Relaxed)
    }

    /// Everything traversal looked at but did not queue
    pub fn ignored(&self) -> u64 {
        self.skipped_dirs.load(Ordering::Relaxed)
            + self.skipped_files.load(Ordering::Relaxed)
            + self.empty_files.load(Ordering::Relaxed)
            + self.non_regular.load(Ordering::Relaxed)
    }
}

/// Walk `config.source_dir`, pushing every eligible file onto the queue
///
/// `tick` runs after each visited entry. The first unreadable directory or
/// entry stops the walk with `BackupError::Walk`; items already queued stay
/// queued.
pub fn traverse(
    config: &BackupConfig,
    queue_tx: &WorkQueueSender,
    stats: &TraverseStats,
    tick: &mut dyn FnMut(),
) -> Result<()> {
    let root = config.source_dir.as_path();
    info!(root = %root.display(), "Walking");

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let prune =
                is_dir(entry) && entry.depth() > 0 && config.is_skipped_dir(&file_name(entry));
            if prune {
                stats.skipped_dirs.fetch_add(1, Ordering::Relaxed);
                debug!(path = %entry.path().display(), "Skipping directory");
            }
            !prune
        });

    for entry in walker {
        let entry = entry.map_err(|e| BackupError::Walk {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
            reason: e.to_string(),
        })?;

        visit(root, &entry, config, queue_tx, stats)?;
        tick();
    }

    Ok(())
}

fn visit(
    root: &Path,
    entry: &DirEntry,
    config: &BackupConfig,
    queue_tx: &WorkQueueSender,
    stats: &TraverseStats,
) -> Result<()> {
    let file_type = entry.file_type();

    if file_type.is_dir() {
        stats.dirs.fetch_add(1, Ordering::Relaxed);
        return Ok(());
    }

    if !file_type.is_file() {
        stats.non_regular.fetch_add(1, Ordering::Relaxed);
        debug!(path = %entry.path().display(), "Skipping non-regular file");
        return Ok(());
    }

    if config.is_skipped_file(&file_name(entry)) {
        stats.skipped_files.fetch_add(1, Ordering::Relaxed);
        return Ok(());
    }

    let size = entry
        .metadata()
        .map_err(|e| BackupError::Walk {
            path: entry.path().to_path_buf(),
            reason: e.to_string(),
        })?
        .len();

    if size == 0 {
        stats.empty_files.fetch_add(1, Ordering::Relaxed);
        info!(path = %entry.path().display(), "File is empty");
        return Ok(());
    }

    let item = WorkItem::new(
        entry.path().to_path_buf(),
        relative_path(root, entry.path()),
        size,
    );
    queue_tx.send(item)?;

    stats.files_queued.fetch_add(1, Ordering::Relaxed);
    stats.bytes_queued.fetch_add(size, Ordering::Relaxed);
    Ok(())
}

fn is_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
}

fn file_name(entry: &DirEntry) -> String {
    entry.file_name().to_string_lossy().into_owned()
}

/// `/`-separated path of `path` below `root`
pub fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
