//! Sample-based content fingerprint
//!
//! Hashing every byte of a multi-gigabyte media file on every run is the
//! dominant cost of a naive backup. Instead, each file is identified by its
//! exact size plus the SHA-256 of a bounded sample:
//!
//! - files smaller than the window are hashed whole
//! - larger files are hashed over exactly `window` bytes starting at
//!   `(size - window) / 2`, the middle of the file
//!
//! This is a probabilistic equality test. Two files of equal size whose
//! middle windows agree are treated as the same content even if they differ
//! elsewhere. That risk is accepted in exchange for bounding per-file cost
//! independently of file size.

use crate::error::FingerprintError;
use sha2::{Digest as _, Sha256};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Default sample window in bytes
pub const DEFAULT_SAMPLE_SIZE: u64 = 128_000;

/// 32-byte SHA-256 digest of a content sample
pub type Digest = [u8; 32];

/// Size of the byte range hashed for each file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleWindow {
    threshold: u64,
}

impl SampleWindow {
    /// Create a window of `threshold` bytes
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    /// Window size in bytes
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Byte range `(offset, len)` that gets hashed for a file of `size` bytes
    pub fn range_for(&self, size: u64) -> (u64, u64) {
        if size < self.threshold {
            (0, size)
        } else {
            ((size - self.threshold) / 2, self.threshold)
        }
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_SIZE)
    }
}

/// Compute the content digest of the file at `path`, whose size is `size`
///
/// `size` is the size observed during traversal. If the file is now shorter
/// than the sample range requires, the read fails with `UnexpectedEof`
/// rather than hashing a truncated sample.
pub fn fingerprint(
    path: &Path,
    size: u64,
    window: SampleWindow,
) -> Result<Digest, FingerprintError> {
    let mut file = File::open(path).map_err(|source| FingerprintError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let (offset, len) = window.range_for(size);
    if offset > 0 {
        file.seek(SeekFrom::Start(offset))
            .map_err(|source| FingerprintError::Seek {
                path: path.to_path_buf(),
                source,
            })?;
    }

    let mut sample = vec![0u8; len as usize];
    file.read_exact(&mut sample)
        .map_err(|source| FingerprintError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(Sha256::digest(&sample).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file_with(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_range_for_small_and_large() {
        let window = SampleWindow::new(100);
        assert_eq!(window.range_for(10), (0, 10));
        assert_eq!(window.range_for(99), (0, 99));
        assert_eq!(window.range_for(100), (0, 100));
        assert_eq!(window.range_for(300), (100, 100));
        assert_eq!(window.range_for(301), (100, 100));
    }

    #[test]
    fn test_small_file_hashes_whole_content() {
        let content = b"Hello, World!";
        let file = temp_file_with(content);

        let digest = fingerprint(file.path(), content.len() as u64, SampleWindow::new(1000)).unwrap();
        let expected: Digest = Sha256::digest(content).into();
        assert_eq!(digest, expected);
    }

    #[test]
    fn test_large_file_hashes_middle_window() {
        let mut content = vec![0u8; 1000];
        for (i, b) in content.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        let file = temp_file_with(&content);

        let window = SampleWindow::new(100);
        let digest = fingerprint(file.path(), 1000, window).unwrap();
        let expected: Digest = Sha256::digest(&content[450..550]).into();
        assert_eq!(digest, expected);
    }

    #[test]
    fn test_edits_outside_window_are_invisible() {
        let base = vec![7u8; 1000];
        let mut edited = base.clone();
        edited[0] = 1;
        edited[999] = 2;

        let a = temp_file_with(&base);
        let b = temp_file_with(&edited);
        let window = SampleWindow::new(100);

        assert_eq!(
            fingerprint(a.path(), 1000, window).unwrap(),
            fingerprint(b.path(), 1000, window).unwrap()
        );

        let mut edited_middle = base.clone();
        edited_middle[500] = 9;
        let c = temp_file_with(&edited_middle);
        assert_ne!(
            fingerprint(a.path(), 1000, window).unwrap(),
            fingerprint(c.path(), 1000, window).unwrap()
        );
    }

    #[test]
    fn test_truncated_file_is_read_error() {
        let file = temp_file_with(b"short");
        let err = fingerprint(file.path(), 50, SampleWindow::new(1000)).unwrap_err();
        match err {
            FingerprintError::Read { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::UnexpectedEof);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = fingerprint(&dir.path().join("nope"), 10, SampleWindow::default()).unwrap_err();
        assert!(matches!(err, FingerprintError::Open { .. }));
    }
}
