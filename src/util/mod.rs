//! Low-level building blocks shared by the memtable and the log
//!
//! - `arena`: bump allocator for memtable entries and index nodes
//! - `coding`: fixed-width and varint encodings
//! - `crc`: masked CRC32C checksums

pub mod arena;
pub mod coding;
pub mod crc;

pub use arena::Arena;
