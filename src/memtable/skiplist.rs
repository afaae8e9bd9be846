//! Arena-backed concurrent skip list
//!
//! Insert-only ordered index with one writer and any number of lock-free
//! readers. Keys and nodes are carved from an [`Arena`] and live as long as
//! the arena, so a reader holding a node pointer can never see it freed.
//!
//! ## Publication
//! A node is fully built (key bytes, key slice, every forward pointer) before
//! the first `Release` store in [`SkipList::insert_with`] links it at level 0.
//! Readers follow forward pointers with `Acquire` loads, so any node they can
//! reach is complete. Linked nodes are never modified again except for their
//! forward pointers, which only ever move to newer successors.
//!
//! ## Writers
//! Inserts take the writer mutex, which also owns the height generator.
//! Readers never touch it.

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::mem;
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::key::Comparator;
use crate::util::arena::{Arena, ALIGN};

/// Tallest tower a node can have
pub(crate) const MAX_HEIGHT: usize = 12;

/// Each level holds roughly 1/BRANCHING of the nodes of the level below
const BRANCHING: u32 = 4;

const HEIGHT_SEED: u64 = 0xdead_beef;

#[repr(C)]
struct Node {
    key_ptr: *const u8,
    key_len: usize,

    /// Level 0 forward pointer. Levels `1..height` follow it in the same
    /// arena allocation.
    next: [AtomicPtr<Node>; 1],
}

impl Node {
    fn alloc_size(height: usize) -> usize {
        mem::size_of::<Node>() + mem::size_of::<AtomicPtr<Node>>() * (height - 1)
    }

    /// SAFETY: `node` must be a live node and `level` below its height.
    unsafe fn next_slot<'a>(node: *const Node, level: usize) -> &'a AtomicPtr<Node> {
        &*ptr::addr_of!((*node).next)
            .cast::<AtomicPtr<Node>>()
            .add(level)
    }

    /// SAFETY: `node` must be a live node.
    unsafe fn key<'a>(node: *const Node) -> &'a [u8] {
        slice::from_raw_parts((*node).key_ptr, (*node).key_len)
    }

    /// SAFETY: as for `next_slot`.
    unsafe fn next(node: *const Node, level: usize) -> *const Node {
        Self::next_slot(node, level).load(Ordering::Acquire)
    }
}

/// Position inside a particular [`SkipList`]; null means "not on an entry".
///
/// A cursor carries no borrow, so it must only be used with the list that
/// produced it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
    node: *const Node,
}

// SAFETY: a cursor points at an immutable, published node that lives as long
// as its arena; the owner of the cursor keeps the list alive.
unsafe impl Send for Cursor {}
unsafe impl Sync for Cursor {}

impl Cursor {
    pub(crate) const fn invalid() -> Self {
        Self {
            node: ptr::null(),
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        !self.node.is_null()
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").field("node", &self.node).finish()
    }
}

/// Sorted, insert-only set of byte strings
pub(crate) struct SkipList<C> {
    compare: C,
    arena: Arc<Arena>,

    /// Sentinel with `MAX_HEIGHT` levels and an empty key
    head: NonNull<Node>,

    /// Height of the tallest tower ever inserted
    max_height: AtomicUsize,

    len: AtomicUsize,

    writer: Mutex<SmallRng>,
}

// SAFETY: all node memory is owned by `arena` (kept alive by the `Arc`),
// nodes are immutable once published, and mutation is serialized by `writer`.
unsafe impl<C: Send> Send for SkipList<C> {}
unsafe impl<C: Sync> Sync for SkipList<C> {}

impl<C: Comparator> SkipList<C> {
    pub fn new(compare: C, arena: Arc<Arena>) -> Self {
        let head = Self::new_node(&arena, MAX_HEIGHT, &[]);
        Self {
            compare,
            arena,
            head,
            max_height: AtomicUsize::new(1),
            len: AtomicUsize::new(0),
            writer: Mutex::new(SmallRng::seed_from_u64(HEIGHT_SEED)),
        }
    }

    /// Copy `key` into the arena and insert it.
    ///
    /// No entry comparing equal to `key` may already be present.
    #[allow(dead_code)]
    pub fn insert(&self, key: &[u8]) {
        self.insert_with(key.len(), |buf| buf.copy_from_slice(key));
    }

    /// Allocate `len` bytes in the arena, let `encode` fill them, and insert
    /// the result as a key.
    pub fn insert_with<F>(&self, len: usize, encode: F)
    where
        F: FnOnce(&mut [u8]),
    {
        let mut rng = self.writer.lock();

        let buf = self.arena.allocate(len);
        encode(&mut buf[..]);
        let key: &[u8] = buf;

        let mut prev = [self.head.as_ptr() as *const Node; MAX_HEIGHT];
        let existing = self.find_greater_or_equal(key, Some(&mut prev));
        debug_assert!(
            existing.is_null()
                || self.compare.compare(key, unsafe { Node::key(existing) }) != CmpOrdering::Equal,
            "duplicate key inserted into skip list"
        );

        let height = Self::random_height(&mut rng);
        if height > self.max_height() {
            // `prev` already holds the head for every level above the old
            // maximum. Readers that see the new height before the node is
            // linked find null at those levels and drop down.
            self.max_height.store(height, Ordering::Relaxed);
        }

        let node = Self::new_node(&self.arena, height, key).as_ptr() as *const Node;

        // SAFETY: `prev[level]` are live nodes at least `level + 1` tall
        // (found at that level, or the head), and `node` has `height` levels.
        unsafe {
            for (level, &before) in prev.iter().enumerate().take(height) {
                let successor = Node::next_slot(before, level).load(Ordering::Relaxed);
                Node::next_slot(node, level).store(successor, Ordering::Relaxed);
            }
            // The level 0 store publishes the node; higher levels add shortcuts.
            for (level, &before) in prev.iter().enumerate().take(height) {
                Node::next_slot(before, level).store(node as *mut Node, Ordering::Release);
            }
        }

        self.len.fetch_add(1, Ordering::Relaxed);
    }

    /// True if an entry comparing equal to `key` is present
    #[allow(dead_code)]
    pub fn contains(&self, key: &[u8]) -> bool {
        let node = self.find_greater_or_equal(key, None);
        // SAFETY: non-null results of a search are published nodes.
        !node.is_null() && self.compare.compare(key, unsafe { Node::key(node) }) == CmpOrdering::Equal
    }

    /// Number of inserted entries
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrowing cursor over this list, initially not on an entry
    #[allow(dead_code)]
    pub fn iter(&self) -> Iter<'_, C> {
        Iter {
            list: self,
            cursor: Cursor::invalid(),
        }
    }

    #[allow(dead_code)]
    pub fn comparator(&self) -> &C {
        &self.compare
    }

    // =========================================================================
    // Cursor primitives (shared with the memtable iterator)
    // =========================================================================

    pub(crate) fn first(&self) -> Cursor {
        // SAFETY: the head is always live and MAX_HEIGHT tall.
        Cursor {
            node: unsafe { Node::next(self.head.as_ptr(), 0) },
        }
    }

    pub(crate) fn last(&self) -> Cursor {
        self.non_head(self.find_last())
    }

    /// First entry at or after `target`
    pub(crate) fn seek(&self, target: &[u8]) -> Cursor {
        Cursor {
            node: self.find_greater_or_equal(target, None),
        }
    }

    pub(crate) fn next(&self, cursor: Cursor) -> Cursor {
        debug_assert!(cursor.is_valid());
        // SAFETY: valid cursors point at published nodes of this list.
        Cursor {
            node: unsafe { Node::next(cursor.node, 0) },
        }
    }

    /// Last entry before the cursor's. There are no back pointers, so this
    /// searches from the head.
    pub(crate) fn prev(&self, cursor: Cursor) -> Cursor {
        debug_assert!(cursor.is_valid());
        let node = self.find_less_than(self.key_at(cursor));
        self.non_head(node)
    }

    pub(crate) fn key_at(&self, cursor: Cursor) -> &[u8] {
        assert!(cursor.is_valid(), "cursor is not positioned on an entry");
        // SAFETY: as in `next`; the key bytes live as long as the arena,
        // which `self` keeps alive.
        unsafe { Node::key(cursor.node) }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn new_node(arena: &Arena, height: usize, key: &[u8]) -> NonNull<Node> {
        debug_assert!(height >= 1 && height <= MAX_HEIGHT);
        debug_assert!(mem::align_of::<Node>() <= ALIGN);

        let raw = arena.allocate_aligned(Node::alloc_size(height));
        let node = raw.as_mut_ptr().cast::<Node>();
        // SAFETY: `raw` is large enough for a node with `height` links and
        // aligned for `Node`; nothing else refers to it yet.
        unsafe {
            ptr::addr_of_mut!((*node).key_ptr).write(key.as_ptr());
            ptr::addr_of_mut!((*node).key_len).write(key.len());
            let links = ptr::addr_of_mut!((*node).next).cast::<AtomicPtr<Node>>();
            for level in 0..height {
                links.add(level).write(AtomicPtr::new(ptr::null_mut()));
            }
            NonNull::new_unchecked(node)
        }
    }

    fn random_height(rng: &mut SmallRng) -> usize {
        let mut height = 1;
        while height < MAX_HEIGHT && rng.gen_ratio(1, BRANCHING) {
            height += 1;
        }
        height
    }

    fn max_height(&self) -> usize {
        self.max_height.load(Ordering::Relaxed)
    }

    fn non_head(&self, node: *const Node) -> Cursor {
        if node == self.head.as_ptr() as *const Node {
            Cursor::invalid()
        } else {
            Cursor { node }
        }
    }

    /// True if `node` holds a key strictly less than `key`
    fn key_is_after_node(&self, key: &[u8], node: *const Node) -> bool {
        // SAFETY: non-null forward pointers reference published nodes.
        !node.is_null() && self.compare.compare(unsafe { Node::key(node) }, key) == CmpOrdering::Less
    }

    /// Earliest node at or after `key`, or null. Fills `prev[level]` with the
    /// node preceding that position at every level below the current height.
    fn find_greater_or_equal(
        &self,
        key: &[u8],
        mut prev: Option<&mut [*const Node; MAX_HEIGHT]>,
    ) -> *const Node {
        let mut x = self.head.as_ptr() as *const Node;
        let mut level = self.max_height() - 1;
        loop {
            // SAFETY: `x` is the head or a node reached at `level`, so it is
            // at least `level + 1` tall.
            let next = unsafe { Node::next(x, level) };
            if self.key_is_after_node(key, next) {
                x = next;
            } else {
                if let Some(prev) = prev.as_mut() {
                    prev[level] = x;
                }
                if level == 0 {
                    return next;
                }
                level -= 1;
            }
        }
    }

    /// Latest node with a key strictly less than `key`, or the head
    fn find_less_than(&self, key: &[u8]) -> *const Node {
        let mut x = self.head.as_ptr() as *const Node;
        let mut level = self.max_height() - 1;
        loop {
            // SAFETY: as in `find_greater_or_equal`.
            let next = unsafe { Node::next(x, level) };
            if self.key_is_after_node(key, next) {
                x = next;
            } else if level == 0 {
                return x;
            } else {
                level -= 1;
            }
        }
    }

    /// Last node in the list, or the head if empty
    fn find_last(&self) -> *const Node {
        let mut x = self.head.as_ptr() as *const Node;
        let mut level = self.max_height() - 1;
        loop {
            // SAFETY: as in `find_greater_or_equal`.
            let next = unsafe { Node::next(x, level) };
            if !next.is_null() {
                x = next;
            } else if level == 0 {
                return x;
            } else {
                level -= 1;
            }
        }
    }
}

impl<C> fmt::Debug for SkipList<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkipList")
            .field("len", &self.len.load(Ordering::Relaxed))
            .field("max_height", &self.max_height.load(Ordering::Relaxed))
            .finish()
    }
}

/// Borrowing bidirectional cursor over a [`SkipList`]
///
/// The memtable walks raw `Cursor`s instead; this is the standalone API.
#[allow(dead_code)]
pub(crate) struct Iter<'a, C> {
    list: &'a SkipList<C>,
    cursor: Cursor,
}

#[allow(dead_code)]
impl<'a, C: Comparator> Iter<'a, C> {
    /// True if positioned on an entry
    pub fn valid(&self) -> bool {
        self.cursor.is_valid()
    }

    /// Key at the current position. Panics if not `valid()`.
    pub fn key(&self) -> &'a [u8] {
        self.list.key_at(self.cursor)
    }

    pub fn next(&mut self) {
        self.cursor = self.list.next(self.cursor);
    }

    pub fn prev(&mut self) {
        self.cursor = self.list.prev(self.cursor);
    }

    /// Position at the first entry at or after `target`
    pub fn seek(&mut self, target: &[u8]) {
        self.cursor = self.list.seek(target);
    }

    pub fn seek_to_first(&mut self) {
        self.cursor = self.list.first();
    }

    pub fn seek_to_last(&mut self) {
        self.cursor = self.list.last();
    }
}
