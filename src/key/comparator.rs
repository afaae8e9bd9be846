//! User key ordering

use std::cmp::Ordering;

/// Total order over user keys.
///
/// Implementations must be consistent for the lifetime of any memtable built
/// with them; the name identifies the ordering to code that persists keys.
pub trait Comparator: Send + Sync {
    fn name(&self) -> &'static str;

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Lexicographic byte-wise ordering
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn name(&self) -> &'static str {
        "scrollkv.BytewiseComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}
