//! Content analysis module
//!
//! This module provides the sample-based content fingerprint used as the
//! second half of every content key.

pub mod fingerprint;

pub use fingerprint::{fingerprint, Digest, SampleWindow, DEFAULT_SAMPLE_SIZE};
