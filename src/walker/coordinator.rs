//! Backup coordinator - orchestrates traversal and the worker pool
//!
//! The coordinator is responsible for:
//! - Setting up the work queue and workers
//! - Traversing the tree on the calling thread
//! - Closing the queue and draining workers, also when traversal fails
//! - Progress reporting and final statistics
//! - Recording run metadata in the store

use crate::config::BackupConfig;
use crate::dedup::{DedupEngine, TouchedSet};
use crate::error::{BackupError, Result};
use crate::remote::RemoteStore;
use crate::store::MetadataStore;
use crate::walker::queue::{QueueStats, WorkQueue, WorkQueueSender};
use crate::walker::traverse::{traverse, TraverseStats};
use crate::walker::worker::{aggregate_stats, OutcomeTotals, Worker};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Interval between progress callbacks
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Result of a backup run
#[derive(Debug)]
pub struct RunResult {
    /// Entry ids observed during the run
    pub touched: Arc<TouchedSet>,

    /// Directories walked
    pub dirs: u64,

    /// Files handed to workers
    pub files_queued: u64,

    /// Sum of sizes of queued files
    pub bytes_queued: u64,

    /// Entries traversal skipped (pruned dirs, skipped/empty/non-regular files)
    pub ignored: u64,

    /// Per-outcome counts
    pub outcomes: OutcomeTotals,

    /// Time taken for the run
    pub duration: Duration,

    /// Whether traversal visited the whole tree
    pub completed: bool,

    /// Why traversal stopped early, if it did
    pub walk_error: Option<BackupError>,
}

impl RunResult {
    pub fn uploaded(&self) -> u64 {
        self.outcomes.uploaded
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.outcomes.bytes_uploaded
    }

    pub fn errors(&self) -> u64 {
        self.outcomes.errors
    }
}

/// Progress information for display
#[derive(Debug, Clone)]
pub struct RunProgress {
    /// Directories walked
    pub dirs: u64,

    /// Files queued so far
    pub files_queued: u64,

    /// Files finished by workers
    pub files_processed: u64,

    /// Uploads so far
    pub uploaded: u64,

    /// Bytes uploaded so far
    pub bytes_uploaded: u64,

    /// Duplicates so far
    pub duplicates: u64,

    /// Per-file errors so far
    pub errors: u64,

    /// Items waiting in the queue
    pub queue_len: u64,

    /// Items taken off the queue by workers
    pub dequeued: u64,

    /// Whether traversal has finished
    pub walk_done: bool,

    /// Elapsed time
    pub elapsed: Duration,
}

impl RunProgress {
    /// Calculate files per second rate
    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.files_processed as f64 / secs
        } else {
            0.0
        }
    }

    /// Files a worker is currently busy with
    pub fn in_flight(&self) -> u64 {
        self.dequeued.saturating_sub(self.files_processed)
    }
}

type ProgressCallback = Box<dyn Fn(&RunProgress)>;

/// Coordinates one backup run
pub struct BackupCoordinator {
    /// Configuration
    config: Arc<BackupConfig>,

    /// Metadata store
    store: Arc<MetadataStore>,

    /// Upload target
    remote: Arc<dyn RemoteStore>,

    /// Worker threads
    workers: Vec<Worker>,

    /// Progress callback
    progress: Option<ProgressCallback>,
}

impl BackupCoordinator {
    /// Create a new coordinator
    pub fn new(
        config: BackupConfig,
        store: Arc<MetadataStore>,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            remote,
            workers: Vec::new(),
            progress: None,
        }
    }

    /// Receive periodic progress snapshots on the calling thread
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RunProgress) + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Run the backup
    ///
    /// Per-file failures are counted in the result. A traversal failure is
    /// returned inside the result (`walk_error`) after every queued file has
    /// been processed; only store and worker-spawn failures abort the run.
    pub fn run(mut self) -> Result<RunResult> {
        let start_time = Instant::now();
        let source = self.config.source_dir.display().to_string();

        info!(
            source = %source,
            name = %self.config.name,
            workers = self.config.threads,
            "Starting backup"
        );
        self.store.record_run_start(&source)?;

        let touched = Arc::new(TouchedSet::new());
        let engine = Arc::new(DedupEngine::new(
            Arc::clone(&self.store),
            Arc::clone(&self.remote),
            Arc::clone(&touched),
            self.config.name.clone(),
            self.config.sample_window(),
        ));

        let queue = WorkQueue::new(self.config.queue_capacity());
        let queue_stats = queue.stats();
        let (queue_tx, queue_rx) = queue.split();

        for id in 0..self.config.threads {
            match Worker::spawn(id, queue_rx.clone(), Arc::clone(&engine)) {
                Ok(worker) => self.workers.push(worker),
                Err(e) => {
                    drop(queue_tx);
                    self.join_workers();
                    return Err(e.into());
                }
            }
        }
        drop(queue_rx);
        info!(count = self.workers.len(), "Workers spawned");

        let traverse_stats = TraverseStats::default();
        let walk_error = self.walk(&queue_tx, &traverse_stats, &queue_stats, start_time);

        // Closing the queue lets workers exit once it drains
        drop(queue_tx);
        self.wait_for_workers(&traverse_stats, &queue_stats, start_time);
        let outcomes = self.join_workers();

        let completed = walk_error.is_none();
        if let Some(e) = &walk_error {
            error!(error = %e, "Walk aborted");
        }

        self.store
            .record_run_end(if completed { "completed" } else { "walk_failed" })?;
        self.store.flush()?;

        let duration = start_time.elapsed();
        info!(
            files = outcomes.files_processed,
            uploaded = outcomes.uploaded,
            duplicates = outcomes.duplicates,
            renamed = outcomes.renamed,
            errors = outcomes.errors,
            bytes = outcomes.bytes_uploaded,
            duration_secs = duration.as_secs(),
            "Backup finished"
        );

        Ok(RunResult {
            touched,
            dirs: traverse_stats.dirs(),
            files_queued: traverse_stats.files_queued(),
            bytes_queued: traverse_stats.bytes_queued(),
            ignored: traverse_stats.ignored(),
            outcomes,
            duration,
            completed,
            walk_error,
        })
    }

    /// Traverse the tree, reporting progress as items are queued
    fn walk(
        &self,
        queue_tx: &WorkQueueSender,
        stats: &TraverseStats,
        queue_stats: &QueueStats,
        start_time: Instant,
    ) -> Option<BackupError> {
        let mut last_report = Instant::now();
        let mut tick = || {
            if last_report.elapsed() >= PROGRESS_INTERVAL {
                self.report_progress(stats, queue_stats, false, start_time);
                last_report = Instant::now();
            }
        };

        traverse(&self.config, queue_tx, stats, &mut tick).err()
    }

    /// Wait for the workers to drain the closed queue
    fn wait_for_workers(
        &self,
        stats: &TraverseStats,
        queue_stats: &QueueStats,
        start_time: Instant,
    ) {
        while !self.workers.iter().all(Worker::is_finished) {
            self.report_progress(stats, queue_stats, true, start_time);
            thread::sleep(PROGRESS_INTERVAL);
        }
        self.report_progress(stats, queue_stats, true, start_time);
    }

    fn report_progress(
        &self,
        stats: &TraverseStats,
        queue_stats: &QueueStats,
        walk_done: bool,
        start_time: Instant,
    ) {
        let Some(callback) = &self.progress else {
            return;
        };

        let totals = aggregate_stats(&self.workers);
        callback(&RunProgress {
            dirs: stats.dirs(),
            files_queued: stats.files_queued(),
            files_processed: totals.files_processed,
            uploaded: totals.uploaded,
            bytes_uploaded: totals.bytes_uploaded,
            duplicates: totals.duplicates,
            errors: totals.errors,
            queue_len: queue_stats.pending(),
            dequeued: queue_stats.dequeued(),
            walk_done,
            elapsed: start_time.elapsed(),
        });
    }

    /// Join all worker threads and collect final stats
    fn join_workers(&mut self) -> OutcomeTotals {
        let totals = aggregate_stats(&self.workers);

        for worker in std::mem::take(&mut self.workers) {
            if let Err(e) = worker.join() {
                warn!(error = %e, "Worker failed to join cleanly");
            }
        }

        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_progress_rate() {
        let progress = RunProgress {
            dirs: 10,
            files_queued: 2000,
            files_processed: 1000,
            uploaded: 10,
            bytes_uploaded: 1024,
            duplicates: 3,
            errors: 0,
            queue_len: 5,
            dequeued: 1004,
            walk_done: false,
            elapsed: Duration::from_secs(10),
        };

        assert!((progress.files_per_second() - 100.0).abs() < 0.1);
        assert_eq!(progress.in_flight(), 4);
    }
}
