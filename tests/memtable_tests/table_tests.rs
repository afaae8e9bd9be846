//! MemTable Tests
//!
//! Tests verify:
//! - Versioned lookups at a sequence number
//! - Tombstone handling
//! - Internal key ordered iteration (forward, backward, seek)
//! - Iterators outliving the table handle
//! - Memory usage tracking
//! - Concurrent readers alongside the writer

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use scrollkv::key::{
    BytewiseComparator, Comparator, InternalKey, InternalKeyComparator, LookupKey, ValueType,
};
use scrollkv::memtable::{LookupResult, MemTable};

// =============================================================================
// Helper Functions
// =============================================================================

fn new_memtable() -> Arc<MemTable> {
    Arc::new(MemTable::new(InternalKeyComparator::new(Arc::new(
        BytewiseComparator,
    ))))
}

fn get(mem: &MemTable, key: &[u8], seq: u64) -> LookupResult {
    mem.get(&LookupKey::new(key, seq))
}

/// (user key, sequence, type) of every entry in iteration order
fn scan(mem: &Arc<MemTable>) -> Vec<(Vec<u8>, u64, ValueType)> {
    let mut iter = mem.iter();
    iter.seek_to_first();
    let mut out = Vec::new();
    while iter.valid() {
        out.push((iter.user_key().to_vec(), iter.sequence(), iter.value_type()));
        iter.next();
    }
    out
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let mem = new_memtable();
    assert!(mem.is_empty());
    assert_eq!(mem.entry_count(), 0);
    assert_eq!(mem.approximate_memory_usage(), 0);
    assert_eq!(get(&mem, b"k", 100), LookupResult::NotFound);
}

#[test]
fn test_add_and_get() {
    let mem = new_memtable();
    mem.add(1, ValueType::Value, b"key1", b"value1");

    assert_eq!(get(&mem, b"key1", 1), LookupResult::Found(b"value1".to_vec()));
    assert_eq!(get(&mem, b"key2", 1), LookupResult::NotFound);
    assert_eq!(mem.entry_count(), 1);
}

#[test]
fn test_get_respects_sequence() {
    let mem = new_memtable();
    mem.add(5, ValueType::Value, b"k", b"v1");
    mem.add(7, ValueType::Value, b"k", b"v2");

    assert_eq!(get(&mem, b"k", 4), LookupResult::NotFound);
    assert_eq!(get(&mem, b"k", 5), LookupResult::Found(b"v1".to_vec()));
    assert_eq!(get(&mem, b"k", 6), LookupResult::Found(b"v1".to_vec()));
    assert_eq!(get(&mem, b"k", 7), LookupResult::Found(b"v2".to_vec()));
    assert_eq!(get(&mem, b"k", 100), LookupResult::Found(b"v2".to_vec()));

    // Both versions are kept
    assert_eq!(mem.entry_count(), 2);
}

#[test]
fn test_get_does_not_match_prefix_keys() {
    let mem = new_memtable();
    mem.add(1, ValueType::Value, b"abc", b"1");
    mem.add(2, ValueType::Value, b"abcd", b"2");

    assert_eq!(get(&mem, b"ab", 10), LookupResult::NotFound);
    assert_eq!(get(&mem, b"abc", 10), LookupResult::Found(b"1".to_vec()));
    assert_eq!(get(&mem, b"abcd", 10), LookupResult::Found(b"2".to_vec()));
    assert_eq!(get(&mem, b"abcde", 10), LookupResult::NotFound);
}

#[test]
fn test_empty_key_and_value() {
    let mem = new_memtable();
    mem.add(1, ValueType::Value, b"", b"");
    assert_eq!(get(&mem, b"", 1), LookupResult::Found(Vec::new()));
}

#[test]
fn test_large_value() {
    let mem = new_memtable();
    let value = vec![0x5a; 100_000];
    mem.add(1, ValueType::Value, b"big", &value);
    assert_eq!(get(&mem, b"big", 1), LookupResult::Found(value));
}

// =============================================================================
// Delete / Tombstone Tests
// =============================================================================

#[test]
fn test_deletion_shadows_older_value() {
    let mem = new_memtable();
    mem.add(1, ValueType::Value, b"k", b"v");
    mem.add(2, ValueType::Deletion, b"k", b"");

    assert_eq!(get(&mem, b"k", 1), LookupResult::Found(b"v".to_vec()));
    assert_eq!(get(&mem, b"k", 2), LookupResult::Deleted);
    assert_eq!(get(&mem, b"k", 50), LookupResult::Deleted);
}

#[test]
fn test_put_after_delete() {
    let mem = new_memtable();
    mem.add(1, ValueType::Value, b"k", b"old");
    mem.add(2, ValueType::Deletion, b"k", b"");
    mem.add(3, ValueType::Value, b"k", b"new");

    assert_eq!(get(&mem, b"k", 2), LookupResult::Deleted);
    assert_eq!(get(&mem, b"k", 3), LookupResult::Found(b"new".to_vec()));
}

#[test]
fn test_deletion_of_missing_key() {
    let mem = new_memtable();
    mem.add(4, ValueType::Deletion, b"ghost", b"");
    assert_eq!(get(&mem, b"ghost", 3), LookupResult::NotFound);
    assert_eq!(get(&mem, b"ghost", 4), LookupResult::Deleted);
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[test]
fn test_iteration_order() {
    let mem = new_memtable();
    mem.add(3, ValueType::Value, b"b", b"b3");
    mem.add(1, ValueType::Value, b"a", b"a1");
    mem.add(5, ValueType::Deletion, b"b", b"");
    mem.add(2, ValueType::Value, b"c", b"c2");
    mem.add(4, ValueType::Value, b"a", b"a4");

    assert_eq!(
        scan(&mem),
        vec![
            (b"a".to_vec(), 4, ValueType::Value),
            (b"a".to_vec(), 1, ValueType::Value),
            (b"b".to_vec(), 5, ValueType::Deletion),
            (b"b".to_vec(), 3, ValueType::Value),
            (b"c".to_vec(), 2, ValueType::Value),
        ]
    );
}

#[test]
fn test_iterator_values_and_keys() {
    let mem = new_memtable();
    mem.add(9, ValueType::Value, b"key", b"value");

    let mut iter = mem.iter();
    assert!(!iter.valid());
    iter.seek_to_first();
    assert!(iter.valid());
    assert_eq!(iter.key(), InternalKey::new(b"key", 9, ValueType::Value).encode());
    assert_eq!(iter.value(), b"value");

    let parsed = iter.parsed_key();
    assert_eq!(parsed.user_key, b"key");
    assert_eq!(parsed.sequence, 9);

    iter.next();
    assert!(!iter.valid());
}

#[test]
fn test_iterator_backward() {
    let mem = new_memtable();
    for (i, key) in [b"a", b"b", b"c", b"d"].iter().enumerate() {
        mem.add(i as u64 + 1, ValueType::Value, *key, b"x");
    }

    let mut iter = mem.iter();
    iter.seek_to_last();
    let mut keys = Vec::new();
    while iter.valid() {
        keys.push(iter.user_key().to_vec());
        iter.prev();
    }
    assert_eq!(keys, vec![b"d".to_vec(), b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
}

#[test]
fn test_iterator_seek() {
    let mem = new_memtable();
    mem.add(1, ValueType::Value, b"apple", b"1");
    mem.add(2, ValueType::Value, b"banana", b"2");
    mem.add(3, ValueType::Value, b"banana", b"3");
    mem.add(4, ValueType::Value, b"cherry", b"4");

    let mut iter = mem.iter();

    // Newest version of banana at or below sequence 2
    iter.seek(InternalKey::new(b"banana", 2, ValueType::Value).encode());
    assert!(iter.valid());
    assert_eq!(iter.user_key(), b"banana");
    assert_eq!(iter.sequence(), 2);

    iter.seek(InternalKey::new(b"blueberry", 100, ValueType::Value).encode());
    assert!(iter.valid());
    assert_eq!(iter.user_key(), b"cherry");

    iter.seek(InternalKey::new(b"zzz", 100, ValueType::Value).encode());
    assert!(!iter.valid());
}

#[test]
fn test_iterator_outlives_handle() {
    let mem = new_memtable();
    mem.add(1, ValueType::Value, b"k1", b"v1");
    mem.add(2, ValueType::Value, b"k2", b"v2");

    let mut iter = mem.iter();
    drop(mem);

    iter.seek_to_first();
    assert_eq!(iter.value(), b"v1");
    iter.next();
    assert_eq!(iter.value(), b"v2");
    assert_eq!(Arc::strong_count(iter.memtable()), 1);
}

// =============================================================================
// Size Tracking Tests
// =============================================================================

#[test]
fn test_memory_usage_grows() {
    let mem = new_memtable();
    let mut last = mem.approximate_memory_usage();
    let mut grew = 0;
    for i in 0..1000u64 {
        let key = format!("key{:06}", i);
        mem.add(i + 1, ValueType::Value, key.as_bytes(), &[7u8; 100]);
        let now = mem.approximate_memory_usage();
        assert!(now >= last);
        if now > last {
            grew += 1;
        }
        last = now;
    }
    assert!(grew > 10);
    assert!(last > 1000 * 100);
}

// =============================================================================
// Concurrent Access Tests
// =============================================================================

#[test]
fn test_concurrent_readers_with_writer() {
    let mem = new_memtable();
    let published = Arc::new(AtomicU64::new(0));
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let mem = Arc::clone(&mem);
            let published = Arc::clone(&published);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(AtomicOrdering::Acquire) {
                    let seq = published.load(AtomicOrdering::Acquire);
                    if seq == 0 {
                        continue;
                    }
                    // Everything published so far must be visible
                    let key = format!("key{:05}", seq);
                    let expected = format!("value{}", seq).into_bytes();
                    assert_eq!(
                        mem.get(&LookupKey::new(key.as_bytes(), seq)),
                        LookupResult::Found(expected)
                    );

                    // A full scan is always sorted
                    let mut iter = mem.iter();
                    iter.seek_to_first();
                    let mut prev: Option<Vec<u8>> = None;
                    while iter.valid() {
                        let current = iter.key().to_vec();
                        if let Some(p) = &prev {
                            assert_eq!(
                                mem.comparator().compare(p, &current),
                                Ordering::Less
                            );
                        }
                        prev = Some(current);
                        iter.next();
                    }
                }
            })
        })
        .collect();

    for seq in 1..=2000u64 {
        let key = format!("key{:05}", seq);
        mem.add(seq, ValueType::Value, key.as_bytes(), format!("value{}", seq).as_bytes());
        published.store(seq, AtomicOrdering::Release);
    }
    done.store(true, AtomicOrdering::Release);

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(mem.entry_count(), 2000);
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #[test]
    fn test_internal_key_order(
        a in prop::collection::vec(any::<u8>(), 0..8),
        b in prop::collection::vec(any::<u8>(), 0..8),
        sa in 0u64..1000,
        sb in 0u64..1000,
    ) {
        let cmp = InternalKeyComparator::new(Arc::new(BytewiseComparator));
        let ka = InternalKey::new(&a, sa, ValueType::Value);
        let kb = InternalKey::new(&b, sb, ValueType::Value);

        let expected = a.cmp(&b).then(sb.cmp(&sa));
        prop_assert_eq!(cmp.compare(ka.encode(), kb.encode()), expected);
    }

    #[test]
    fn test_scan_matches_sorted_model(entries in prop::collection::btree_map(
        prop::collection::vec(any::<u8>(), 0..6),
        prop::collection::vec(any::<u8>(), 0..6),
        0..60,
    )) {
        let mem = new_memtable();
        for (seq, (k, v)) in entries.iter().enumerate() {
            mem.add(seq as u64 + 1, ValueType::Value, k, v);
        }

        let mut iter = mem.iter();
        iter.seek_to_first();
        for (k, v) in &entries {
            prop_assert!(iter.valid());
            prop_assert_eq!(iter.user_key(), k.as_slice());
            prop_assert_eq!(iter.value(), v.as_slice());
            iter.next();
        }
        prop_assert!(!iter.valid());
    }
}
