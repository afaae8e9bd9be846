//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Frame arbitrary-length records into fixed 32 KiB blocks
//! - Masked CRC32C checksums for corruption detection
//! - Fragment records that cross block boundaries
//! - Crash recovery and replay
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────── block (32768) ────────────────────────────┐
//! │ ┌─────────┬─────────┬──────────┬──────────┐                           │
//! │ │ CRC (4) │ Len (2) │ Type (1) │ Payload  │ ... more records ...      │
//! │ └─────────┴─────────┴──────────┴──────────┘              │ trailer │  │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//! CRC covers the type byte and the payload. Type is Full, or First /
//! Middle... / Last for a record split across blocks. A trailer of fewer than
//! 7 zero bytes pads a block whose remaining space cannot hold a header.

mod format;
mod reader;
mod recovery;
mod sink;
mod writer;

pub use format::{RecordType, BLOCK_SIZE, HEADER_SIZE, MAX_RECORD_TYPE};
pub use reader::{DropCounter, Reporter, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use sink::{AppendSink, FileSink};
pub use writer::WalWriter;
