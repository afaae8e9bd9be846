//! Log block format shared by the writer and the reader
//!
//! The log is a sequence of 32 KiB blocks. Every physical record lies inside
//! one block; a logical record that does not fit is split into fragments.
//! When fewer than `HEADER_SIZE` bytes remain in a block they are zero-filled
//! (the trailer) and the next record starts at the next block.

/// Size of one log block
pub const BLOCK_SIZE: usize = 32768;

/// checksum (4) + length (2) + type (1)
pub const HEADER_SIZE: usize = 4 + 2 + 1;

/// Type byte of a physical record. The values are part of the on-disk format.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// Reserved for preallocated (zeroed) regions
    Zero = 0,

    /// A complete logical record
    Full = 1,

    /// Fragments of a logical record spanning blocks
    First = 2,
    Middle = 3,
    Last = 4,
}

/// Highest valid record type value
pub const MAX_RECORD_TYPE: u8 = RecordType::Last as u8;

impl RecordType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(RecordType::Zero),
            1 => Some(RecordType::Full),
            2 => Some(RecordType::First),
            3 => Some(RecordType::Middle),
            4 => Some(RecordType::Last),
            _ => None,
        }
    }

    /// Type of a fragment given whether it starts and/or ends its record
    pub(crate) fn for_fragment(begin: bool, end: bool) -> Self {
        match (begin, end) {
            (true, true) => RecordType::Full,
            (true, false) => RecordType::First,
            (false, true) => RecordType::Last,
            (false, false) => RecordType::Middle,
        }
    }
}
