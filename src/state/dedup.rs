use std::collections::{HashSet, VecDeque};

/// Best-effort memory of inbound message ids.
///
/// Insertion-ordered and capped: once `capacity` is exceeded the oldest half
/// is dropped in one pass, so a very old id may be accepted again.
#[derive(Debug)]
pub struct DedupGuard {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
    duplicates_dropped: u64,
}

impl DedupGuard {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            order: VecDeque::with_capacity(capacity + 1),
            seen: HashSet::with_capacity(capacity + 1),
            capacity,
            duplicates_dropped: 0,
        }
    }

    pub fn seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn record(&mut self, id: &str) {
        if !self.seen.insert(id.to_string()) {
            return;
        }
        self.order.push_back(id.to_string());

        if self.order.len() > self.capacity {
            let evict = self.order.len() / 2;
            for old in self.order.drain(..evict) {
                self.seen.remove(&old);
            }
        }
    }

    /// `seen` + `record` in one step. Returns true for a duplicate.
    pub fn check_and_record(&mut self, id: &str) -> bool {
        if self.seen(id) {
            self.duplicates_dropped += 1;
            return true;
        }
        self.record(id);
        false
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn duplicates_dropped(&self) -> u64 {
        self.duplicates_dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_recorded_ids() {
        let mut guard = DedupGuard::new(10);

        assert!(!guard.check_and_record("m1"));
        assert!(guard.check_and_record("m1"));
        assert!(guard.seen("m1"));
        assert!(!guard.seen("m2"));
        assert_eq!(guard.duplicates_dropped(), 1);
    }

    #[test]
    fn memory_stays_bounded() {
        let mut guard = DedupGuard::new(100);

        for i in 0..10_000 {
            guard.record(&format!("m{i}"));
            assert!(guard.len() <= 100);
            assert_eq!(guard.len(), guard.seen.len());
        }
    }

    #[test]
    fn evicts_oldest_half_in_bulk() {
        let mut guard = DedupGuard::new(4);
        for id in ["a", "b", "c", "d", "e"] {
            guard.record(id);
        }

        // 5 > 4, so the two oldest go.
        assert!(!guard.seen("a"));
        assert!(!guard.seen("b"));
        assert!(guard.seen("c"));
        assert!(guard.seen("e"));
        assert_eq!(guard.len(), 3);
    }

    #[test]
    fn recording_twice_does_not_duplicate_order() {
        let mut guard = DedupGuard::new(4);
        guard.record("a");
        guard.record("a");
        assert_eq!(guard.len(), 1);
    }
}
