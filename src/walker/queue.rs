//! Bounded work queue between traversal and workers
//!
//! Traversal pushes one item per regular file; workers pull until the queue
//! is closed and drained. The bound is the only flow control: when every
//! slot is taken, traversal blocks until a worker frees one.

use crate::error::WorkerError;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A file to process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Absolute path on disk
    pub path: PathBuf,

    /// Path relative to the backup root, `/`-separated
    pub relative: String,

    /// Size observed during traversal
    pub size: u64,
}

impl WorkItem {
    pub fn new(path: PathBuf, relative: String, size: u64) -> Self {
        Self {
            path,
            relative,
            size,
        }
    }
}

/// Statistics for the work queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total items enqueued
    pub enqueued: AtomicU64,

    /// Total items dequeued
    pub dequeued: AtomicU64,
}

impl QueueStats {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn dequeued(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }

    /// Items sent but not yet taken by a worker
    pub fn pending(&self) -> u64 {
        self.enqueued().saturating_sub(self.dequeued())
    }
}

/// Bounded multi-consumer queue of work items
pub struct WorkQueue {
    sender: Sender<WorkItem>,
    receiver: Receiver<WorkItem>,
    capacity: usize,
    stats: Arc<QueueStats>,
}

impl WorkQueue {
    /// Create a new work queue with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);

        Self {
            sender,
            receiver,
            capacity,
            stats: Arc::new(QueueStats::default()),
        }
    }

    /// Get queue capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get queue statistics
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }

    /// Split into the producer handle and a cloneable consumer handle
    ///
    /// The queue closes once the sender (and every clone of it) is dropped.
    pub fn split(self) -> (WorkQueueSender, WorkQueueReceiver) {
        (
            WorkQueueSender {
                sender: self.sender,
                stats: Arc::clone(&self.stats),
            },
            WorkQueueReceiver {
                receiver: self.receiver,
                stats: self.stats,
            },
        )
    }
}

/// Handle for sending items to the queue
pub struct WorkQueueSender {
    sender: Sender<WorkItem>,
    stats: Arc<QueueStats>,
}

impl WorkQueueSender {
    /// Send an item, blocking while the queue is full
    ///
    /// Fails only if every receiver is gone.
    pub fn send(&self, item: WorkItem) -> Result<(), WorkerError> {
        self.sender
            .send(item)
            .map_err(|_| WorkerError::QueueClosed)?;
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Handle for receiving items from the queue
#[derive(Clone)]
pub struct WorkQueueReceiver {
    receiver: Receiver<WorkItem>,
    stats: Arc<QueueStats>,
}

impl WorkQueueReceiver {
    /// Receive an item from the queue
    ///
    /// Blocks until an item is available. Returns `None` once the queue is
    /// closed and drained.
    pub fn recv(&self) -> Option<WorkItem> {
        match self.receiver.recv() {
            Ok(item) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                Some(item)
            }
            Err(_) => None,
        }
    }
}
