//! MemTable cursor
//!
//! Walks entries in internal key order: ascending user key, newest version
//! first. Owns an `Arc<MemTable>`, so it may outlive the handle it came from.

use std::fmt;
use std::sync::Arc;

use crate::key::{split_internal_key, ParsedInternalKey, SequenceNumber, ValueType};
use crate::util::coding::put_varint32;

use super::skiplist::Cursor;
use super::table::decode_entry;
use super::MemTable;

/// Bidirectional cursor over a [`MemTable`]
pub struct MemTableIterator {
    mem: Arc<MemTable>,
    cursor: Cursor,

    /// Length-prefixed seek target
    scratch: Vec<u8>,
}

impl MemTableIterator {
    pub(super) fn new(mem: Arc<MemTable>) -> Self {
        Self {
            mem,
            cursor: Cursor::invalid(),
            scratch: Vec::new(),
        }
    }

    /// True if positioned on an entry
    pub fn valid(&self) -> bool {
        self.cursor.is_valid()
    }

    /// Position at the first entry whose internal key is at or after
    /// `internal_key`
    pub fn seek(&mut self, internal_key: &[u8]) {
        self.scratch.clear();
        put_varint32(&mut self.scratch, internal_key.len() as u32);
        self.scratch.extend_from_slice(internal_key);
        self.cursor = self.mem.table.seek(&self.scratch);
    }

    pub fn seek_to_first(&mut self) {
        self.cursor = self.mem.table.first();
    }

    pub fn seek_to_last(&mut self) {
        self.cursor = self.mem.table.last();
    }

    /// Advance to the next entry. Requires `valid()`.
    pub fn next(&mut self) {
        self.cursor = self.mem.table.next(self.cursor);
    }

    /// Step back to the previous entry. Requires `valid()`.
    pub fn prev(&mut self) {
        self.cursor = self.mem.table.prev(self.cursor);
    }

    /// Internal key at the current position
    pub fn key(&self) -> &[u8] {
        decode_entry(self.mem.table.key_at(self.cursor)).0
    }

    pub fn value(&self) -> &[u8] {
        decode_entry(self.mem.table.key_at(self.cursor)).1
    }

    pub fn parsed_key(&self) -> ParsedInternalKey<'_> {
        split_internal_key(self.key())
    }

    pub fn user_key(&self) -> &[u8] {
        self.parsed_key().user_key
    }

    pub fn sequence(&self) -> SequenceNumber {
        self.parsed_key().sequence
    }

    pub fn value_type(&self) -> ValueType {
        self.parsed_key().value_type
    }

    /// The table this cursor walks
    pub fn memtable(&self) -> &Arc<MemTable> {
        &self.mem
    }
}

impl fmt::Debug for MemTableIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("MemTableIterator");
        if self.valid() {
            d.field("key", &self.parsed_key().to_string());
        } else {
            d.field("key", &None::<String>);
        }
        d.finish()
    }
}
