//! Per-run set of entry ids observed during traversal

use parking_lot::Mutex;
use std::collections::HashSet;

/// Entry ids seen during the current run
///
/// Shared by all workers. Never persisted; a new run starts empty.
#[derive(Debug, Default)]
pub struct TouchedSet {
    ids: Mutex<HashSet<u64>>,
}

impl TouchedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as touched, returning whether it already was
    pub fn mark(&self, id: u64) -> bool {
        !self.ids.lock().insert(id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids.lock().contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }

    /// Copy of the touched ids
    pub fn snapshot(&self) -> HashSet<u64> {
        self.ids.lock().clone()
    }
}

impl FromIterator<u64> for TouchedSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self {
            ids: Mutex::new(iter.into_iter().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_mark_reports_previous_state() {
        let touched = TouchedSet::new();
        assert!(!touched.mark(4));
        assert!(touched.mark(4));
        assert!(touched.contains(4));
        assert!(!touched.contains(5));
        assert_eq!(touched.len(), 1);
    }

    #[test]
    fn test_concurrent_mark_has_single_winner() {
        let touched = Arc::new(TouchedSet::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let touched = Arc::clone(&touched);
                thread::spawn(move || touched.mark(99))
            })
            .collect();

        let first_marks = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|was_touched| !was_touched)
            .count();
        assert_eq!(first_marks, 1);
    }
}
