//! WAL Writer
//!
//! Frames opaque payloads into checksummed physical records.

use tracing::trace;

use crate::error::Result;
use crate::util::coding::encode_fixed32;
use crate::util::crc;

use super::format::{RecordType, BLOCK_SIZE, HEADER_SIZE, MAX_RECORD_TYPE};
use super::sink::AppendSink;

const TRAILER: [u8; HEADER_SIZE - 1] = [0; HEADER_SIZE - 1];

/// Appends logical records to a log.
///
/// One caller at a time: every method takes `&mut self`. The writer holds no
/// buffered data of its own between calls; each physical record is handed to
/// the sink and flushed before `add_record` moves on.
#[derive(Debug)]
pub struct WalWriter<S> {
    dest: S,

    /// Current offset within the current block
    block_offset: usize,

    /// CRC32C of each record type byte, the seed for every record checksum
    type_crc: [u32; MAX_RECORD_TYPE as usize + 1],
}

impl<S: AppendSink> WalWriter<S> {
    /// Writer for an empty destination
    pub fn new(dest: S) -> Self {
        Self::with_offset(dest, 0)
    }

    /// Writer that continues a log already holding `dest_length` bytes
    pub fn with_offset(dest: S, dest_length: u64) -> Self {
        let mut type_crc = [0u32; MAX_RECORD_TYPE as usize + 1];
        for (byte, crc) in type_crc.iter_mut().enumerate() {
            *crc = crc::value(&[byte as u8]);
        }
        Self {
            dest,
            block_offset: (dest_length % BLOCK_SIZE as u64) as usize,
            type_crc,
        }
    }

    /// Append one logical record.
    ///
    /// On error the record may be partially written and must be treated as
    /// not durable; the caller must not apply it.
    pub fn add_record(&mut self, payload: &[u8]) -> Result<()> {
        let mut left = payload;
        let mut begin = true;

        // An empty payload still produces one zero-length Full record.
        loop {
            let leftover = BLOCK_SIZE - self.block_offset;
            if leftover < HEADER_SIZE {
                if leftover > 0 {
                    trace!(leftover, "filling block trailer");
                    self.dest.append(&TRAILER[..leftover])?;
                }
                self.block_offset = 0;
            }

            // A block never ends with less than a header's worth of space.
            debug_assert!(BLOCK_SIZE - self.block_offset >= HEADER_SIZE);

            let avail = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let (fragment, rest) = left.split_at(left.len().min(avail));
            let record_type = RecordType::for_fragment(begin, rest.is_empty());

            self.emit_physical_record(record_type, fragment)?;
            left = rest;
            begin = false;

            if left.is_empty() {
                return Ok(());
            }
        }
    }

    /// Flush and make every appended record durable
    pub fn sync(&mut self) -> Result<()> {
        self.dest.sync()?;
        Ok(())
    }

    /// Offset within the current block where the next record starts
    pub fn block_offset(&self) -> usize {
        self.block_offset
    }

    pub fn get_ref(&self) -> &S {
        &self.dest
    }

    pub fn into_inner(self) -> S {
        self.dest
    }

    fn emit_physical_record(&mut self, record_type: RecordType, fragment: &[u8]) -> Result<()> {
        let len = fragment.len();
        debug_assert!(len <= 0xffff);
        debug_assert!(self.block_offset + HEADER_SIZE + len <= BLOCK_SIZE);

        let mut header = [0u8; HEADER_SIZE];
        let crc = crc::extend(self.type_crc[record_type as usize], fragment);
        encode_fixed32(&mut header[..4], crc::mask(crc));
        header[4] = (len & 0xff) as u8;
        header[5] = (len >> 8) as u8;
        header[6] = record_type as u8;

        self.block_offset += HEADER_SIZE + len;

        self.dest.append(&header)?;
        self.dest.append(fragment)?;
        self.dest.flush()?;
        Ok(())
    }
}
