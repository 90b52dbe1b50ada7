//! Per-unit-of-work record of the bytes last read for each saga.
//!
//! Create one tracker per logical unit of work (typically one inbound message),
//! pass it by reference to every saga store call of that unit, then drop it.
//! Update and complete compare the stored bytes against what this tracker saw.

use std::collections::HashMap;

use sagastore_core::SagaId;

#[derive(Debug, Default, Clone)]
pub struct VersionTracker {
    reads: HashMap<SagaId, Vec<u8>>,
}

impl VersionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `bytes` as the last read of `id`, replacing any earlier read.
    pub fn record(&mut self, id: SagaId, bytes: Vec<u8>) {
        self.reads.insert(id, bytes);
    }

    pub fn lookup(&self, id: &SagaId) -> Option<&[u8]> {
        self.reads.get(id).map(Vec::as_slice)
    }

    pub fn forget(&mut self, id: &SagaId) -> Option<Vec<u8>> {
        self.reads.remove(id)
    }

    pub fn len(&self) -> usize {
        self.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_overwrites_previous_read() {
        let id = SagaId::new();
        let mut tracker = VersionTracker::new();

        tracker.record(id, b"first".to_vec());
        tracker.record(id, b"second".to_vec());

        assert_eq!(tracker.lookup(&id), Some(&b"second"[..]));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn trackers_are_independent() {
        let id = SagaId::new();
        let mut a = VersionTracker::new();
        let b = VersionTracker::new();

        a.record(id, b"x".to_vec());

        assert!(a.lookup(&id).is_some());
        assert!(b.lookup(&id).is_none());
    }

    #[test]
    fn forget_removes_entry() {
        let id = SagaId::new();
        let mut tracker = VersionTracker::new();
        tracker.record(id, b"x".to_vec());

        assert_eq!(tracker.forget(&id), Some(b"x".to_vec()));
        assert!(tracker.is_empty());
    }
}
