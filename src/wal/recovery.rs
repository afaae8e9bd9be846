//! WAL Recovery
//!
//! Replays a log of write batches into a MemTable after a restart.

use std::fs::{File, OpenOptions};
use std::io::BufReader;
use std::path::Path;

use tracing::{info, warn};

use crate::batch::WriteBatch;
use crate::error::{Result, ScrollError};
use crate::key::SequenceNumber;
use crate::memtable::MemTable;

use super::reader::{DropCounter, WalReader};

/// Handles WAL recovery after a crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of batches successfully replayed
    pub records_recovered: u64,

    /// Bytes skipped because they were damaged
    pub bytes_dropped: u64,

    /// Highest sequence number seen in a replayed batch
    pub last_sequence: SequenceNumber,

    /// Offset just past the last intact record
    pub valid_length: u64,

    /// Whether bytes past `valid_length` (a torn tail) were removed
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Replay every intact batch in the log at `path` into `mem`, then cut
    /// the file back to the end of the last intact record so new records are
    /// not appended after a torn one.
    ///
    /// With `paranoid` set, the first damaged record aborts recovery with
    /// `Corruption`; otherwise damaged data is skipped and counted.
    pub fn recover(path: &Path, mem: &MemTable, paranoid: bool) -> Result<RecoveryResult> {
        let mut result = Self::replay(path, paranoid, |batch| batch.insert_into(mem))?;

        let file_len = std::fs::metadata(path)?.len();
        if file_len > result.valid_length {
            warn!(
                path = %path.display(),
                from = file_len,
                to = result.valid_length,
                "truncating torn WAL tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(result.valid_length)?;
            file.sync_all()?;
            result.was_truncated = true;
        }

        info!(
            path = %path.display(),
            records = result.records_recovered,
            bytes_dropped = result.bytes_dropped,
            last_sequence = result.last_sequence,
            "WAL recovery finished"
        );
        Ok(result)
    }

    /// Check the integrity of a log without modifying it or applying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Self::replay(path, false, |batch| batch.operations().map(|_| ()))
    }

    fn replay<F>(path: &Path, paranoid: bool, mut apply: F) -> Result<RecoveryResult>
    where
        F: FnMut(&WriteBatch) -> Result<()>,
    {
        let file = File::open(path)?;
        let mut reader = WalReader::new(BufReader::new(file));
        let mut result = RecoveryResult::default();

        while let Some(record) = reader.read_record()? {
            if paranoid {
                Self::check_reporter(reader.reporter())?;
            }
            result.valid_length = reader.consumed_offset();

            let record_len = record.len() as u64;
            let applied = WriteBatch::from_contents(record).and_then(|batch| {
                apply(&batch)?;
                Ok(batch)
            });

            match applied {
                Ok(batch) => {
                    result.records_recovered += 1;
                    if batch.count() > 0 {
                        let last = batch.sequence() + batch.count() as u64 - 1;
                        result.last_sequence = result.last_sequence.max(last);
                    }
                }
                Err(e) if paranoid => return Err(e),
                Err(e) => {
                    warn!(error = %e, bytes = record_len, "skipping unreadable write batch");
                    result.bytes_dropped += record_len;
                }
            }
        }

        if paranoid {
            Self::check_reporter(reader.reporter())?;
        }
        result.bytes_dropped += reader.reporter().bytes_dropped;
        Ok(result)
    }

    fn check_reporter(reporter: &DropCounter) -> Result<()> {
        match &reporter.first_error {
            Some(reason) => Err(ScrollError::Corruption(format!(
                "{} ({} bytes dropped)",
                reason, reporter.bytes_dropped
            ))),
            None => Ok(()),
        }
    }
}
