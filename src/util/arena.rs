//! Bump-pointer arena
//!
//! Hands out byte regions carved from 4 KiB blocks. Nothing is freed until the
//! arena itself is dropped, so every region stays valid for the arena's
//! lifetime. Requests larger than a quarter block get a dedicated block so a
//! single big entry does not waste the tail of a standard one.
//!
//! The cursor is guarded by a mutex that only allocating threads take; the
//! usage counter is a plain atomic that readers can poll at any time.

use std::alloc::{self, Layout};
use std::mem;
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::CachePadded;
use parking_lot::Mutex;

/// Size of a standard arena block
pub const BLOCK_SIZE: usize = 4096;

/// Alignment guaranteed by [`Arena::allocate_aligned`]
pub const ALIGN: usize = if mem::size_of::<usize>() > 8 {
    mem::size_of::<usize>()
} else {
    8
};

const _: () = assert!(ALIGN.is_power_of_two());

/// Monotonic allocator backing memtable entries and skip list nodes
pub struct Arena {
    state: Mutex<BumpState>,

    /// Bytes obtained from the host, including per-block bookkeeping
    memory_usage: CachePadded<AtomicUsize>,
}

struct BumpState {
    /// Next free byte in the current block (null before the first block)
    alloc_ptr: *mut u8,

    /// Free bytes left after `alloc_ptr` in the current block
    remaining: usize,

    blocks: Vec<Block>,
}

/// One host allocation owned by the arena
struct Block {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl Drop for Block {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from `alloc_zeroed` with exactly this layout and
        // is released only here.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// SAFETY: the raw pointers in `BumpState` refer to blocks owned by the arena.
// The cursor is only touched under the mutex, and every region handed out is
// disjoint from every other, so sharing the arena across threads cannot alias
// a live `&mut`.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BumpState {
                alloc_ptr: ptr::null_mut(),
                remaining: 0,
                blocks: Vec::new(),
            }),
            memory_usage: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Allocate `bytes` zeroed bytes with no alignment guarantee.
    ///
    /// The region lives until the arena is dropped. A zero-byte request
    /// returns an empty slice without touching the cursor.
    #[allow(clippy::mut_from_ref)]
    pub fn allocate(&self, bytes: usize) -> &mut [u8] {
        if bytes == 0 {
            return &mut [];
        }

        let mut state = self.state.lock();
        let ptr = if bytes <= state.remaining {
            let result = state.alloc_ptr;
            // SAFETY: `bytes <= remaining`, so the cursor stays inside the block.
            state.alloc_ptr = unsafe { result.add(bytes) };
            state.remaining -= bytes;
            result
        } else {
            self.allocate_fallback(&mut state, bytes)
        };
        drop(state);

        // SAFETY: `ptr..ptr+bytes` lies in a live block, is zero-initialized
        // and is never handed out again.
        unsafe { slice::from_raw_parts_mut(ptr, bytes) }
    }

    /// Allocate `bytes` zeroed bytes aligned to [`ALIGN`].
    #[allow(clippy::mut_from_ref)]
    pub fn allocate_aligned(&self, bytes: usize) -> &mut [u8] {
        if bytes == 0 {
            return &mut [];
        }

        let mut state = self.state.lock();
        let current_mod = (state.alloc_ptr as usize) & (ALIGN - 1);
        let slop = if current_mod == 0 { 0 } else { ALIGN - current_mod };
        let needed = bytes + slop;

        let ptr = if needed <= state.remaining {
            // SAFETY: `needed <= remaining`, so both offsets stay in the block.
            let result = unsafe { state.alloc_ptr.add(slop) };
            state.alloc_ptr = unsafe { state.alloc_ptr.add(needed) };
            state.remaining -= needed;
            result
        } else {
            // Fresh blocks are always aligned
            self.allocate_fallback(&mut state, bytes)
        };
        drop(state);

        debug_assert_eq!(ptr as usize & (ALIGN - 1), 0);

        // SAFETY: as in `allocate`.
        unsafe { slice::from_raw_parts_mut(ptr, bytes) }
    }

    /// Total bytes obtained from the host so far.
    ///
    /// Safe to call while another thread allocates; the value may lag by one
    /// block.
    pub fn memory_usage(&self) -> usize {
        self.memory_usage.load(Ordering::Relaxed)
    }

    fn allocate_fallback(&self, state: &mut BumpState, bytes: usize) -> *mut u8 {
        if bytes > BLOCK_SIZE / 4 {
            // Dedicated block; the shared cursor keeps its current block.
            return self.allocate_new_block(state, bytes);
        }

        // The tail of the current block is wasted.
        let block = self.allocate_new_block(state, BLOCK_SIZE);
        // SAFETY: `bytes <= BLOCK_SIZE / 4 < BLOCK_SIZE`.
        state.alloc_ptr = unsafe { block.add(bytes) };
        state.remaining = BLOCK_SIZE - bytes;
        block
    }

    fn allocate_new_block(&self, state: &mut BumpState, block_bytes: usize) -> *mut u8 {
        let Ok(layout) = Layout::from_size_align(block_bytes, ALIGN) else {
            panic!("arena block of {} bytes overflows isize", block_bytes);
        };
        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };

        state.blocks.push(Block { ptr, layout });
        self.memory_usage
            .fetch_add(block_bytes + mem::size_of::<usize>(), Ordering::Relaxed);
        ptr.as_ptr()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("memory_usage", &self.memory_usage())
            .finish()
    }
}
