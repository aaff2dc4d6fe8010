use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic, zero-padded identifier sequence (`OFF-000001`, `AUD-000042`).
///
/// Sequences resume past the highest identifier already persisted so a reopened
/// store never hands out a duplicate.
#[derive(Debug)]
pub struct IdSequence {
    prefix: &'static str,
    next: AtomicU64,
}

impl IdSequence {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            next: AtomicU64::new(1),
        }
    }

    pub fn resume<'a>(prefix: &'static str, existing: impl IntoIterator<Item = &'a str>) -> Self {
        let sequence = Self::new(prefix);
        sequence.observe(existing);
        sequence
    }

    /// Advance past any identifier in `existing` that belongs to this sequence.
    pub fn observe<'a>(&self, existing: impl IntoIterator<Item = &'a str>) {
        let highest = existing
            .into_iter()
            .filter_map(|id| self.parse(id))
            .max()
            .unwrap_or(0);
        self.next.fetch_max(highest + 1, Ordering::Relaxed);
    }

    pub fn next_id(&self) -> String {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{id:06}", self.prefix)
    }

    fn parse(&self, id: &str) -> Option<u64> {
        id.strip_prefix(self.prefix)?
            .strip_prefix('-')?
            .parse()
            .ok()
    }
}

/// Creation order for sequence identifiers, robust past six digits.
pub fn compare_sequence_ids(left: &str, right: &str) -> CmpOrdering {
    left.len()
        .cmp(&right.len())
        .then_with(|| left.cmp(right))
}
