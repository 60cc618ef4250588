//! Worker thread logic for the backup pool
//!
//! Each worker:
//! - Pulls file items from the work queue until it is closed and drained
//! - Runs each item through the dedup engine
//! - Counts per-file failures (logged by the engine) and moves on; a failed
//!   file never stops the run

use crate::dedup::{DedupEngine, FileOutcome};
use crate::error::WorkerError;
use crate::walker::queue::WorkQueueReceiver;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Files taken off the queue
    pub files_processed: AtomicU64,

    /// Files whose content was uploaded
    pub uploaded: AtomicU64,

    /// Uploads that completed an earlier, interrupted entry
    pub resumed: AtomicU64,

    /// Duplicates of content seen earlier in the run
    pub duplicates: AtomicU64,

    /// Known content found under a new path
    pub renamed: AtomicU64,

    /// Known content at its known path
    pub unchanged: AtomicU64,

    /// Bytes sent to the remote
    pub bytes_uploaded: AtomicU64,

    /// Files that failed
    pub errors: AtomicU64,
}

impl WorkerStats {
    fn record(&self, outcome: &FileOutcome) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            FileOutcome::Uploaded { resumed, bytes, .. } => {
                if *resumed {
                    self.resumed.fetch_add(1, Ordering::Relaxed);
                }
                self.bytes_uploaded.fetch_add(*bytes, Ordering::Relaxed);
                &self.uploaded
            }
            FileOutcome::Duplicate { .. } => &self.duplicates,
            FileOutcome::Renamed { .. } => &self.renamed,
            FileOutcome::Unchanged => &self.unchanged,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Totals across all workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeTotals {
    pub files_processed: u64,
    pub uploaded: u64,
    pub resumed: u64,
    pub duplicates: u64,
    pub renamed: u64,
    pub unchanged: u64,
    pub bytes_uploaded: u64,
    pub errors: u64,
}

/// A worker thread that processes file items
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<()>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(
        id: usize,
        queue_rx: WorkQueueReceiver,
        engine: Arc<DedupEngine>,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("backup-worker-{}", id))
            .spawn(move || worker_loop(id, queue_rx, engine, stats_clone))
            .map_err(|e| WorkerError::SpawnFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// True once the thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| WorkerError::Panicked {
                id: self.id,
                message: "Worker thread panicked".into(),
            }),
            None => Ok(()),
        }
    }
}

/// Main worker loop
fn worker_loop(
    id: usize,
    queue_rx: WorkQueueReceiver,
    engine: Arc<DedupEngine>,
    stats: Arc<WorkerStats>,
) {
    debug!(worker = id, "Worker starting");

    while let Some(item) = queue_rx.recv() {
        match engine.process(&item) {
            Ok(outcome) => stats.record(&outcome),
            Err(_) => {
                stats.record_error();
                debug!(worker = id, path = %item.path.display(), "Skipping failed file");
            }
        }
    }

    debug!(
        worker = id,
        files = stats.files_processed.load(Ordering::Relaxed),
        "Worker shutting down"
    );
}

/// Aggregate statistics from multiple workers
pub fn aggregate_stats(workers: &[Worker]) -> OutcomeTotals {
    let mut totals = OutcomeTotals::default();

    for worker in workers {
        let s = &worker.stats;
        totals.files_processed += s.files_processed.load(Ordering::Relaxed);
        totals.uploaded += s.uploaded.load(Ordering::Relaxed);
        totals.resumed += s.resumed.load(Ordering::Relaxed);
        totals.duplicates += s.duplicates.load(Ordering::Relaxed);
        totals.renamed += s.renamed.load(Ordering::Relaxed);
        totals.unchanged += s.unchanged.load(Ordering::Relaxed);
        totals.bytes_uploaded += s.bytes_uploaded.load(Ordering::Relaxed);
        totals.errors += s.errors.load(Ordering::Relaxed);
    }

    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_stats() {
        let stats = WorkerStats::default();

        stats.record(&FileOutcome::Uploaded {
            resumed: true,
            reused: false,
            bytes: 1024,
        });
        stats.record(&FileOutcome::Duplicate { of: "a".into() });
        stats.record(&FileOutcome::Unchanged);
        stats.record(&FileOutcome::Renamed { from: "b".into() });
        stats.record_error();

        assert_eq!(stats.files_processed.load(Ordering::Relaxed), 5);
        assert_eq!(stats.uploaded.load(Ordering::Relaxed), 1);
        assert_eq!(stats.resumed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.bytes_uploaded.load(Ordering::Relaxed), 1024);
        assert_eq!(stats.duplicates.load(Ordering::Relaxed), 1);
        assert_eq!(stats.unchanged.load(Ordering::Relaxed), 1);
        assert_eq!(stats.renamed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.errors.load(Ordering::Relaxed), 1);
    }
}
