use std::collections::BTreeMap;
use std::mem;
use std::sync::Mutex;

use wharf_core::ContentHash;

/// Collects `wire key -> hash` pairs until a populate-sized batch is full.
///
/// Hash workers push concurrently; whichever push crosses the limit walks
/// away with the full batch and the map starts over.
pub(crate) struct BatchAccumulator {
    limit: usize,
    pending: Mutex<BTreeMap<String, ContentHash>>,
}

impl BatchAccumulator {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    /// Adds one entry. Returns the accumulated batch once it reaches the
    /// configured size.
    pub(crate) fn push(
        &self,
        wire_key: String,
        hash: ContentHash,
    ) -> Option<BTreeMap<String, ContentHash>> {
        let mut pending = self.pending.lock().unwrap();
        pending.insert(wire_key, hash);
        if pending.len() >= self.limit {
            Some(mem::take(&mut *pending))
        } else {
            None
        }
    }

    /// Takes whatever is left, if anything. Called once hashing is done.
    pub(crate) fn drain(&self) -> Option<BTreeMap<String, ContentHash>> {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_empty() {
            None
        } else {
            Some(mem::take(&mut *pending))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_entries_below_the_limit() {
        let batcher = BatchAccumulator::new(3);
        assert!(batcher.push("/a".into(), "h1".into()).is_none());
        assert!(batcher.push("/b".into(), "h2".into()).is_none());
        let batch = batcher.push("/c".into(), "h3".into()).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batcher.drain().is_none());
    }

    #[test]
    fn drain_returns_the_partial_batch() {
        let batcher = BatchAccumulator::new(10);
        batcher.push("/a".into(), "h1".into());
        batcher.push("/b".into(), "h2".into());
        let rest = batcher.drain().unwrap();
        assert_eq!(rest.keys().collect::<Vec<_>>(), ["/a", "/b"]);
        assert!(batcher.drain().is_none());
    }

    #[test]
    fn duplicate_keys_overwrite_within_a_batch() {
        let batcher = BatchAccumulator::new(10);
        batcher.push("/a".into(), "old".into());
        batcher.push("/a".into(), "new".into());
        let rest = batcher.drain().unwrap();
        assert_eq!(rest["/a"], "new");
    }

    #[test]
    fn a_zero_limit_still_forms_batches() {
        let batcher = BatchAccumulator::new(0);
        let batch = batcher.push("/a".into(), "h1".into()).unwrap();
        assert_eq!(batch.len(), 1);
    }
}
