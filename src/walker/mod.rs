//! Parallel backup pipeline
//!
//! One traversal thread feeds a bounded queue drained by N worker threads.
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │   BackupCoordinator     │
//!                     │  - walkdir traversal    │
//!                     │  - skip rules           │
//!                     └───────────┬─────────────┘
//!                                 │ bounded queue (2 × workers)
//!       ┌─────────────────────────┼─────────────────────────┐
//!       │                         │                         │
//! ┌─────▼─────┐             ┌─────▼─────┐             ┌─────▼─────┐
//! │  Worker 1 │             │  Worker 2 │             │  Worker N │
//! │  sample   │             │  sample   │             │  sample   │
//! │  dedup    │             │  dedup    │             │  dedup    │
//! │  upload   │             │  upload   │             │  upload   │
//! └───────────┘             └───────────┘             └───────────┘
//! ```

pub mod coordinator;
pub mod queue;
pub mod traverse;
pub mod worker;

pub use coordinator::{BackupCoordinator, RunProgress, RunResult};
pub use queue::{WorkItem, WorkQueue};
pub use traverse::TraverseStats;
pub use worker::OutcomeTotals;
