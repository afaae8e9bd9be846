//! Write Batch
//!
//! A batch is the unit the engine logs and applies atomically. Its encoding
//! is the WAL payload:
//!
//! ```text
//! ┌──────────────┬────────────┬───────────────────────────────────────┐
//! │ sequence (8) │ count (4)  │ records...                            │
//! └──────────────┴────────────┴───────────────────────────────────────┘
//! record := Value    (1) varstring(key) varstring(value)
//!         | Deletion (0) varstring(key)
//! varstring := varint32(len) bytes
//! ```
//!
//! Records take consecutive sequence numbers starting at the header's.

use std::fmt;

use crate::error::{Result, ScrollError};
use crate::key::{SequenceNumber, ValueType};
use crate::memtable::MemTable;
use crate::util::coding::{
    decode_fixed32, decode_fixed64, encode_fixed32, encode_fixed64, get_length_prefixed_slice,
    put_length_prefixed_slice,
};

/// sequence (8) + count (4)
pub const BATCH_HEADER_SIZE: usize = 12;

/// One mutation inside a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<'a> {
    /// Put a key-value pair
    Put { key: &'a [u8], value: &'a [u8] },

    /// Delete a key
    Delete { key: &'a [u8] },
}

impl<'a> Operation<'a> {
    pub fn key(&self) -> &'a [u8] {
        match self {
            Operation::Put { key, .. } | Operation::Delete { key } => *key,
        }
    }
}

/// Ordered collection of puts and deletes applied as a unit
#[derive(Clone, PartialEq, Eq)]
pub struct WriteBatch {
    rep: Vec<u8>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self {
            rep: vec![0; BATCH_HEADER_SIZE],
        }
    }

    /// Rebuild a batch from its encoded form (e.g. a log record)
    pub fn from_contents(contents: Vec<u8>) -> Result<Self> {
        if contents.len() < BATCH_HEADER_SIZE {
            return Err(ScrollError::corruption(format!(
                "write batch too small: {} bytes",
                contents.len()
            )));
        }
        Ok(Self { rep: contents })
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(ValueType::Value as u8);
        put_length_prefixed_slice(&mut self.rep, key);
        put_length_prefixed_slice(&mut self.rep, value);
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(ValueType::Deletion as u8);
        put_length_prefixed_slice(&mut self.rep, key);
    }

    /// Drop every operation, keeping the allocation
    pub fn clear(&mut self) {
        self.rep.clear();
        self.rep.resize(BATCH_HEADER_SIZE, 0);
    }

    /// Append the operations of `other` after this batch's
    pub fn append(&mut self, other: &WriteBatch) {
        self.set_count(self.count() + other.count());
        self.rep.extend_from_slice(&other.rep[BATCH_HEADER_SIZE..]);
    }

    /// Number of operations
    pub fn count(&self) -> u32 {
        decode_fixed32(&self.rep[8..])
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Sequence number of the first operation
    pub fn sequence(&self) -> SequenceNumber {
        decode_fixed64(&self.rep)
    }

    pub fn set_sequence(&mut self, sequence: SequenceNumber) {
        encode_fixed64(&mut self.rep, sequence);
    }

    /// Encoded batch, the payload written to the log
    pub fn contents(&self) -> &[u8] {
        &self.rep
    }

    /// Size of the encoded batch in bytes
    pub fn approximate_size(&self) -> usize {
        self.rep.len()
    }

    /// Decode operations in order. Stops after the first malformed record.
    pub fn iter(&self) -> BatchIter<'_> {
        BatchIter {
            input: &self.rep[BATCH_HEADER_SIZE..],
            failed: false,
        }
    }

    /// Apply every operation to `mem`, numbering them from `sequence()`.
    ///
    /// The whole batch is decoded before anything is applied, so a malformed
    /// batch leaves `mem` untouched.
    pub fn insert_into(&self, mem: &MemTable) -> Result<()> {
        let ops = self.operations()?;
        let mut sequence = self.sequence();
        for op in ops {
            match op {
                Operation::Put { key, value } => mem.add(sequence, ValueType::Value, key, value),
                Operation::Delete { key } => mem.add(sequence, ValueType::Deletion, key, &[]),
            }
            sequence += 1;
        }
        Ok(())
    }

    /// Decode every operation, checking the total against the header count
    pub fn operations(&self) -> Result<Vec<Operation<'_>>> {
        let ops = self.iter().collect::<Result<Vec<_>>>()?;
        if ops.len() != self.count() as usize {
            return Err(ScrollError::corruption(format!(
                "write batch has wrong count: header says {}, found {}",
                self.count(),
                ops.len()
            )));
        }
        Ok(ops)
    }

    fn set_count(&mut self, count: u32) {
        encode_fixed32(&mut self.rep[8..], count);
    }
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WriteBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteBatch")
            .field("sequence", &self.sequence())
            .field("count", &self.count())
            .field("size", &self.rep.len())
            .finish()
    }
}

/// Iterator over the operations of a [`WriteBatch`]
pub struct BatchIter<'a> {
    input: &'a [u8],
    failed: bool,
}

impl<'a> BatchIter<'a> {
    fn fail(&mut self, msg: &str) -> Option<Result<Operation<'a>>> {
        self.failed = true;
        Some(Err(ScrollError::corruption(msg)))
    }
}

impl<'a> Iterator for BatchIter<'a> {
    type Item = Result<Operation<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.input.is_empty() {
            return None;
        }

        let input: &'a [u8] = self.input;
        let tag = input[0];
        let rest = &input[1..];
        match ValueType::try_from(tag) {
            Ok(ValueType::Value) => {
                let Some((key, rest)) = get_length_prefixed_slice(rest) else {
                    return self.fail("bad write batch put key");
                };
                let Some((value, rest)) = get_length_prefixed_slice(rest) else {
                    return self.fail("bad write batch put value");
                };
                self.input = rest;
                Some(Ok(Operation::Put { key, value }))
            }
            Ok(ValueType::Deletion) => {
                let Some((key, rest)) = get_length_prefixed_slice(rest) else {
                    return self.fail("bad write batch delete key");
                };
                self.input = rest;
                Some(Ok(Operation::Delete { key }))
            }
            Err(_) => self.fail("unknown write batch tag"),
        }
    }
}
