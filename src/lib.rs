//! # scrollkv
//!
//! The write path of a log-structured key-value store:
//! - Write-Ahead Logging (WAL) in checksummed 32 KiB blocks
//! - Arena-backed, lock-free-read skip list MemTable
//! - Versioned internal keys with snapshot reads by sequence number
//! - Crash recovery with torn-tail handling
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │            (Single Writer / Multi Reader)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  WriteBatch (sequence, count, records)
//!          ┌────────────┴────────────┐
//!          │ 1. append               │ 2. insert
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐     rotate     ┌─────────────┐
//!   │     WAL     │          │  MemTable   │ ─────────────▶ │  Immutable  │
//!   │  (blocks)   │          │ (skip list) │                │  MemTables  │
//!   └─────────────┘          └──────┬──────┘                └─────────────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │    Arena    │
//!                           │   (bump)    │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod util;

pub mod key;
pub mod memtable;
pub mod wal;
pub mod batch;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, ScrollError};
pub use config::{Config, WalSyncStrategy};
pub use engine::Engine;
pub use batch::{Operation, WriteBatch};
pub use key::{InternalKeyComparator, LookupKey, SequenceNumber, ValueType};
pub use memtable::{LookupResult, MemTable, MemTableIterator};
pub use util::Arena;
pub use wal::{WalReader, WalRecovery, WalWriter};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of scrollkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
