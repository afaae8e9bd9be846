//! MemTable Module
//!
//! In-memory buffer of recent writes, ordered by internal key.
//!
//! ## Responsibilities
//! - Accept versioned entries from a single writer without blocking readers
//! - Point lookups at a sequence number (snapshot visibility)
//! - Ordered, bidirectional iteration over every version
//! - Report arena usage so the owner can decide when to rotate
//!
//! ## Data Structure Choice
//! Entries are encoded into one arena buffer each and indexed by an
//! arena-backed skip list:
//! - No per-entry heap allocation; the whole table is freed at once
//! - Insert never modifies a published node, so readers need no lock
//! - Newest version of a key sorts first, so a lookup stops at the first hit
//!
//! ## Entry Format
//! ```text
//! ┌──────────────┬──────────┬──────────┬──────────────┬───────┐
//! │ varint32(n+8)│ user key │ tag (8)  │ varint32(vl) │ value │
//! └──────────────┴──────────┴──────────┴──────────────┴───────┘
//! ```

mod iterator;
mod skiplist;
mod table;

pub use iterator::MemTableIterator;
pub use table::MemTable;

/// Outcome of a point lookup in a MemTable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResult {
    /// The newest visible version is a live value
    Found(Vec<u8>),

    /// The newest visible version is a tombstone; older layers must not be
    /// consulted
    Deleted,

    /// No version of the key is visible here; consult older layers
    NotFound,
}
