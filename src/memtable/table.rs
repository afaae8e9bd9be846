//! MemTable implementation
//!
//! Arena + skip list + internal key encoding.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::key::{
    pack_sequence_and_type, split_internal_key, BytewiseComparator, Comparator,
    InternalKeyComparator, LookupKey, SequenceNumber, ValueType, TAG_SIZE,
};
use crate::util::coding::{encode_fixed64, encode_varint32, get_length_prefixed_slice, varint_length};
use crate::util::Arena;

use super::iterator::MemTableIterator;
use super::skiplist::SkipList;
use super::LookupResult;

/// Orders skip list entries by the length-prefixed internal key at their start
pub(crate) struct KeyComparator {
    comparator: InternalKeyComparator,
}

impl Comparator for KeyComparator {
    fn name(&self) -> &'static str {
        "scrollkv.MemTableKeyComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.comparator.compare(entry_key(a), entry_key(b))
    }
}

/// Internal key at the front of an entry or seek target
pub(crate) fn entry_key(entry: &[u8]) -> &[u8] {
    match get_length_prefixed_slice(entry) {
        Some((key, _)) => key,
        None => panic!("memtable entry without a valid key prefix"),
    }
}

/// Internal key and value of an entry
pub(crate) fn decode_entry(entry: &[u8]) -> (&[u8], &[u8]) {
    let (key, rest) = match get_length_prefixed_slice(entry) {
        Some(split) => split,
        None => panic!("memtable entry without a valid key prefix"),
    };
    match get_length_prefixed_slice(rest) {
        Some((value, _)) => (key, value),
        None => panic!("memtable entry without a valid value prefix"),
    }
}

/// In-memory table of recent writes
///
/// ## Concurrency
/// - `add`: one writer at a time; concurrent callers are serialized by the
///   skip list's writer lock
/// - `get` / iterators: any number of threads, lock free, concurrent with `add`
///
/// ## Lifetime
/// Shared as `Arc<MemTable>`. Iterators hold their own `Arc`, so the arena
/// (and every entry) lives until the last handle or iterator is dropped.
pub struct MemTable {
    comparator: InternalKeyComparator,

    /// Backing memory for entries and index nodes
    arena: Arc<Arena>,

    pub(super) table: SkipList<KeyComparator>,
}

impl MemTable {
    /// Create an empty MemTable ordered by `comparator`
    pub fn new(comparator: InternalKeyComparator) -> Self {
        let arena = Arc::new(Arena::new());
        let table = SkipList::new(
            KeyComparator {
                comparator: comparator.clone(),
            },
            Arc::clone(&arena),
        );
        Self {
            comparator,
            arena,
            table,
        }
    }

    /// Bytes of arena memory in use (entries plus index nodes)
    pub fn approximate_memory_usage(&self) -> usize {
        self.arena.memory_usage()
    }

    /// Add an entry mapping `key` to `value` at `sequence`.
    ///
    /// A deletion is recorded with `ValueType::Deletion` and (typically) an
    /// empty value. `(key, sequence)` must be unique within the table.
    ///
    /// # Panics
    /// If the encoded key or value length does not fit in 32 bits.
    pub fn add(&self, sequence: SequenceNumber, value_type: ValueType, key: &[u8], value: &[u8]) {
        let internal_key_size = key.len() + TAG_SIZE;
        assert!(
            internal_key_size <= u32::MAX as usize && value.len() <= u32::MAX as usize,
            "memtable entry too large"
        );
        let encoded_len = varint_length(internal_key_size as u64)
            + internal_key_size
            + varint_length(value.len() as u64)
            + value.len();

        self.table.insert_with(encoded_len, |buf| {
            let mut pos = encode_varint32(buf, internal_key_size as u32);
            buf[pos..pos + key.len()].copy_from_slice(key);
            pos += key.len();
            encode_fixed64(&mut buf[pos..], pack_sequence_and_type(sequence, value_type));
            pos += TAG_SIZE;
            pos += encode_varint32(&mut buf[pos..], value.len() as u32);
            buf[pos..].copy_from_slice(value);
            debug_assert_eq!(pos + value.len(), buf.len());
        });
    }

    /// Look up the newest version of `key.user_key()` with a sequence at or
    /// below the lookup sequence.
    pub fn get(&self, key: &LookupKey) -> LookupResult {
        let cursor = self.table.seek(key.memtable_key());
        if !cursor.is_valid() {
            return LookupResult::NotFound;
        }

        // The seek skipped every entry with a larger sequence, so only the
        // user key needs checking.
        let (internal_key, value) = decode_entry(self.table.key_at(cursor));
        let parsed = split_internal_key(internal_key);
        if self
            .comparator
            .user_comparator()
            .compare(parsed.user_key, key.user_key())
            != Ordering::Equal
        {
            return LookupResult::NotFound;
        }

        match parsed.value_type {
            ValueType::Value => LookupResult::Found(value.to_vec()),
            ValueType::Deletion => LookupResult::Deleted,
        }
    }

    /// Cursor over every entry in internal key order, initially not
    /// positioned. The cursor keeps this table alive.
    pub fn iter(self: &Arc<Self>) -> MemTableIterator {
        MemTableIterator::new(Arc::clone(self))
    }

    /// Number of entries (including tombstones)
    pub fn entry_count(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn comparator(&self) -> &InternalKeyComparator {
        &self.comparator
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new(InternalKeyComparator::new(Arc::new(BytewiseComparator)))
    }
}

impl fmt::Debug for MemTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemTable")
            .field("entries", &self.entry_count())
            .field("memory_usage", &self.approximate_memory_usage())
            .finish()
    }
}
