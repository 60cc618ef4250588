//! Metadata store module
//!
//! Provides the durable content key → entry index backing deduplication.
//!
//! # Features
//!
//! - **Atomic check-and-create**: `add_if_absent` looks up or creates an
//!   entry in one serialized transaction; during a run the same transaction
//!   marks the entry id as touched
//! - **Field updates**: `update_by_key` may change only path, cloud and checksum
//! - **Snapshot iteration**: `for_each_entry` walks a consistent view in key order
//! - **Compact storage**: bincode values, 40-byte fixed-width keys
//!
//! # Module Structure
//!
//! - `schema`: Column families, key encoding, Entry struct
//! - `catalog`: MetadataStore transactions
//! - `stats`: Aggregate statistics for the `stats` command

pub mod catalog;
pub mod schema;
pub mod stats;

pub use catalog::{Admission, EntryState, EntryUpdate, MetadataStore};
pub use schema::{meta_keys, ContentKey, Entry};
pub use stats::{compute_stats, StoreStats};
