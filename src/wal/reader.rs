//! WAL Reader
//!
//! Reassembles logical records from the block format written by
//! [`WalWriter`](super::WalWriter).
//!
//! Damage is reported, not fatal: a bad physical record drops the rest of its
//! block and the reader resumes at the next record it can trust. A truncated
//! tail (the writer died mid-record) reads as a clean end of log.

use std::io::{self, Read};

use tracing::warn;

use crate::error::Result;
use crate::util::coding::decode_fixed32;
use crate::util::crc;

use super::format::{RecordType, BLOCK_SIZE, HEADER_SIZE};

/// Receives notice of bytes the reader skipped
pub trait Reporter {
    /// `bytes` were dropped for `reason`
    fn corruption(&mut self, bytes: usize, reason: &str);
}

/// Default reporter: logs each drop and keeps running totals
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DropCounter {
    pub bytes_dropped: u64,
    pub first_error: Option<String>,
}

impl Reporter for DropCounter {
    fn corruption(&mut self, bytes: usize, reason: &str) {
        warn!(bytes, reason, "dropping damaged log data");
        self.bytes_dropped += bytes as u64;
        if self.first_error.is_none() {
            self.first_error = Some(reason.to_string());
        }
    }
}

/// Result of reading one physical record
enum Physical {
    Record {
        kind: u8,
        start: usize,
        len: usize,
    },
    Eof,
    Bad,
}

/// Reads logical records from a log stream
pub struct WalReader<R, P = DropCounter> {
    src: R,
    reporter: P,
    checksum: bool,

    /// Current block; unread data is `block[pos..]`
    block: Vec<u8>,
    pos: usize,

    /// Last read returned less than a full block
    eof: bool,

    /// Offset of the first byte past `block`
    end_of_buffer_offset: u64,

    /// Offset of the last record returned by `read_record`
    last_record_offset: u64,

    /// Records starting before this offset are skipped
    initial_offset: u64,

    /// Skipping fragments of a record that began before `initial_offset`
    resyncing: bool,
}

impl<R: Read> WalReader<R, DropCounter> {
    /// Reader over `src` that verifies checksums and counts dropped bytes
    pub fn new(src: R) -> Self {
        Self::with_reporter(src, DropCounter::default(), true, 0)
    }
}

impl<R: Read, P: Reporter> WalReader<R, P> {
    /// Reader returning the first record starting at or after
    /// `initial_offset`
    pub fn with_reporter(src: R, reporter: P, checksum: bool, initial_offset: u64) -> Self {
        Self {
            src,
            reporter,
            checksum,
            block: Vec::with_capacity(BLOCK_SIZE),
            pos: 0,
            eof: false,
            end_of_buffer_offset: 0,
            last_record_offset: 0,
            initial_offset,
            resyncing: initial_offset > 0,
        }
    }

    /// Read the next logical record, or `None` at the end of the log.
    ///
    /// Only I/O failures on the source are errors; damaged data goes to the
    /// reporter.
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        if self.last_record_offset < self.initial_offset && !self.skip_to_initial_block()? {
            return Ok(None);
        }

        let mut scratch: Vec<u8> = Vec::new();
        let mut in_fragmented_record = false;
        // Offset of the logical record being assembled
        let mut prospective_record_offset = 0u64;

        loop {
            let physical = self.read_physical_record()?;

            if self.resyncing {
                match physical {
                    Physical::Record { kind, .. } if kind == RecordType::Middle as u8 => continue,
                    Physical::Record { kind, .. } if kind == RecordType::Last as u8 => {
                        self.resyncing = false;
                        continue;
                    }
                    _ => self.resyncing = false,
                }
            }

            match physical {
                Physical::Record { kind, start, len } => {
                    let fragment = start..start + len;
                    let physical_record_offset =
                        self.consumed_offset() - (HEADER_SIZE + len) as u64;
                    match RecordType::from_u8(kind) {
                        Some(RecordType::Full) => {
                            if in_fragmented_record && !scratch.is_empty() {
                                self.report_corruption(scratch.len(), "partial record without end(1)");
                            }
                            self.last_record_offset = physical_record_offset;
                            return Ok(Some(self.block[fragment].to_vec()));
                        }
                        Some(RecordType::First) => {
                            if in_fragmented_record && !scratch.is_empty() {
                                self.report_corruption(scratch.len(), "partial record without end(2)");
                            }
                            prospective_record_offset = physical_record_offset;
                            scratch.clear();
                            scratch.extend_from_slice(&self.block[fragment]);
                            in_fragmented_record = true;
                        }
                        Some(RecordType::Middle) => {
                            if in_fragmented_record {
                                scratch.extend_from_slice(&self.block[fragment]);
                            } else {
                                self.report_corruption(len, "missing start of fragmented record(1)");
                            }
                        }
                        Some(RecordType::Last) => {
                            if in_fragmented_record {
                                scratch.extend_from_slice(&self.block[fragment]);
                                self.last_record_offset = prospective_record_offset;
                                return Ok(Some(scratch));
                            }
                            self.report_corruption(len, "missing start of fragmented record(2)");
                        }
                        Some(RecordType::Zero) | None => {
                            let dropped = len + if in_fragmented_record { scratch.len() } else { 0 };
                            self.report_corruption(dropped, &format!("unknown record type {}", kind));
                            in_fragmented_record = false;
                            scratch.clear();
                        }
                    }
                }
                Physical::Eof => {
                    // A partial record at the tail means the writer died
                    // mid-record; that is not corruption.
                    return Ok(None);
                }
                Physical::Bad => {
                    if in_fragmented_record {
                        self.report_corruption(scratch.len(), "error in middle of record");
                        in_fragmented_record = false;
                        scratch.clear();
                    }
                }
            }
        }
    }

    /// Offset of the last record returned by `read_record`
    pub fn last_record_offset(&self) -> u64 {
        self.last_record_offset
    }

    /// Offset just past the last physical record consumed
    pub fn consumed_offset(&self) -> u64 {
        self.end_of_buffer_offset - self.buffered() as u64
    }

    pub fn reporter(&self) -> &P {
        &self.reporter
    }

    pub fn into_reporter(self) -> P {
        self.reporter
    }

    fn buffered(&self) -> usize {
        self.block.len() - self.pos
    }

    fn clear_buffer(&mut self) {
        self.pos = self.block.len();
    }

    /// Skip whole blocks before the one containing `initial_offset`
    fn skip_to_initial_block(&mut self) -> Result<bool> {
        let block_size = BLOCK_SIZE as u64;
        let offset_in_block = self.initial_offset % block_size;
        let mut block_start = self.initial_offset - offset_in_block;

        // Inside a trailer: nothing can start there
        if offset_in_block > block_size - (HEADER_SIZE as u64 - 1) {
            block_start += block_size;
        }

        self.end_of_buffer_offset = block_start;
        if block_start > 0 {
            let skipped = io::copy(&mut (&mut self.src).take(block_start), &mut io::sink())?;
            if skipped < block_start {
                self.eof = true;
                self.clear_buffer();
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn read_physical_record(&mut self) -> Result<Physical> {
        loop {
            if self.buffered() < HEADER_SIZE {
                if self.eof {
                    // Truncated header at the end of the log
                    self.clear_buffer();
                    return Ok(Physical::Eof);
                }

                self.block.clear();
                self.pos = 0;
                (&mut self.src)
                    .take(BLOCK_SIZE as u64)
                    .read_to_end(&mut self.block)?;
                self.end_of_buffer_offset += self.block.len() as u64;
                if self.block.len() < BLOCK_SIZE {
                    self.eof = true;
                }
                continue;
            }

            let header = &self.block[self.pos..self.pos + HEADER_SIZE];
            let len = header[4] as usize | (header[5] as usize) << 8;
            let kind = header[6];

            if HEADER_SIZE + len > self.buffered() {
                let dropped = self.buffered();
                self.clear_buffer();
                if !self.eof {
                    self.report_corruption(dropped, "bad record length");
                    return Ok(Physical::Bad);
                }
                // The writer died while writing this record
                return Ok(Physical::Eof);
            }

            if kind == RecordType::Zero as u8 && len == 0 {
                // Preallocated file region; skip quietly
                self.clear_buffer();
                return Ok(Physical::Bad);
            }

            if self.checksum {
                let expected = crc::unmask(decode_fixed32(header));
                let start = self.pos + HEADER_SIZE - 1;
                let actual = crc::value(&self.block[start..start + 1 + len]);
                if actual != expected {
                    // The length itself may be damaged, so drop the rest of
                    // the block rather than trusting it.
                    let dropped = self.buffered();
                    self.clear_buffer();
                    self.report_corruption(dropped, "checksum mismatch");
                    return Ok(Physical::Bad);
                }
            }

            let start = self.pos + HEADER_SIZE;
            self.pos += HEADER_SIZE + len;

            // Skip records that started before the initial offset
            let record_start =
                self.end_of_buffer_offset - self.buffered() as u64 - (HEADER_SIZE + len) as u64;
            if record_start < self.initial_offset {
                return Ok(Physical::Bad);
            }

            return Ok(Physical::Record { kind, start, len });
        }
    }

    fn report_corruption(&mut self, bytes: usize, reason: &str) {
        let drop_start = (self.end_of_buffer_offset - self.buffered() as u64).saturating_sub(bytes as u64);
        if drop_start >= self.initial_offset {
            self.reporter.corruption(bytes, reason);
        }
    }
}
