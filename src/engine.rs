//! Engine Module
//!
//! The write path that ties the log and the memtables together.
//!
//! ## Responsibilities
//! - Assign sequence numbers to write batches
//! - Log every batch before it becomes visible (write-ahead)
//! - Rotate the active MemTable once it outgrows `write_buffer_size`
//! - Replay the log into a fresh MemTable on startup

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::batch::{Operation, WriteBatch};
use crate::config::{Config, WalSyncStrategy};
use crate::error::{Result, ScrollError};
use crate::key::{
    BytewiseComparator, InternalKeyComparator, LookupKey, SequenceNumber, MAX_SEQUENCE_NUMBER,
    TAG_SIZE,
};
use crate::memtable::{LookupResult, MemTable};
use crate::wal::{AppendSink, FileSink, WalRecovery, WalWriter};

/// Destination of the engine's log
pub(crate) type LogSink = Box<dyn AppendSink + Send>;

/// Log writer plus the bookkeeping for the sync strategy.
/// Holding this lock is what makes a caller "the writer".
struct WriterState {
    wal: WalWriter<LogSink>,

    /// Batches appended since the last fsync
    unsynced: usize,

    /// First log failure. Once set, writes and syncs fail until the engine
    /// is reopened: a failed batch may still be in the log under sequence
    /// numbers that were never published, so they cannot be handed out again.
    failed: Option<String>,
}

impl WriterState {
    fn check_usable(&self) -> Result<()> {
        match &self.failed {
            Some(reason) => Err(ScrollError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("log unusable after earlier failure: {}", reason),
            ))),
            None => Ok(()),
        }
    }

    fn fail(&mut self, err: &ScrollError) {
        warn!(error = %err, "write failed after reaching the log, rejecting writes until reopen");
        self.failed = Some(err.to_string());
    }
}

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (write/put/delete/sync): Serialized by the `writer` lock
///   - Order: log append → (fsync) → memtable insert → publish sequence
///   - A failed append or sync leaves the engine read-only until reopened
///
/// - **Reads** (get/get_at): Never take the writer lock
///   - The active MemTable is read without locking; the `RwLock`s only guard
///     swapping which table is active
///   - A read sees exactly the batches whose sequence is at or below the
///     published `last_sequence`
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Path of the write-ahead log
    wal_path: PathBuf,

    /// Exclusive writer state
    writer: Mutex<WriterState>,

    /// MemTable receiving new writes
    mem: RwLock<Arc<MemTable>>,

    /// Rotated MemTables, newest first. Nothing drains this list.
    imm: RwLock<Vec<Arc<MemTable>>>,

    /// Sequence of the newest applied write
    last_sequence: AtomicU64,

    comparator: InternalKeyComparator,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create data directory
    /// 2. Replay the WAL (if any) into a fresh MemTable
    /// 3. Reopen the WAL for append, continuing its block layout
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with(config, |path| {
            let file = FileSink::open_append(path)?;
            let len = file.len();
            let sink: LogSink = Box::new(file);
            Ok((sink, len))
        })
    }

    /// Open with a caller-supplied log sink.
    ///
    /// `open_sink` receives the log path after recovery and returns the sink
    /// together with the length of the log it continues.
    pub(crate) fn open_with<F>(config: Config, open_sink: F) -> Result<Self>
    where
        F: FnOnce(&Path) -> Result<(LogSink, u64)>,
    {
        config.validate()?;

        // Step 1: Create data directory if it doesn't exist
        fs::create_dir_all(&config.data_dir)?;
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        // Step 2: Recover
        let comparator = InternalKeyComparator::new(Arc::new(BytewiseComparator));
        let mem = Arc::new(MemTable::new(comparator.clone()));
        let mut last_sequence = 0;
        if wal_path.exists() {
            let result = WalRecovery::recover(&wal_path, &mem, config.paranoid_checks)?;
            last_sequence = result.last_sequence;
        }

        // Step 3: Resume appending where the intact log ends
        let (sink, len) = open_sink(&wal_path)?;
        let wal = WalWriter::with_offset(sink, len);

        info!(
            data_dir = %config.data_dir.display(),
            entries = mem.entry_count(),
            last_sequence,
            "engine opened"
        );

        Ok(Self {
            config,
            wal_path,
            writer: Mutex::new(WriterState {
                wal,
                unsynced: 0,
                failed: None,
            }),
            mem: RwLock::new(mem),
            imm: RwLock::new(Vec::new()),
            last_sequence: AtomicU64::new(last_sequence),
            comparator,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Apply `batch` atomically.
    ///
    /// The batch is stamped with the next sequence number, appended to the
    /// log (and synced if the strategy calls for it), and only then inserted
    /// into the active MemTable. If logging fails nothing is applied, the
    /// batch's sequence numbers stay unpublished, and every later write
    /// fails until the engine is reopened.
    pub fn write(&self, batch: &mut WriteBatch) -> Result<()> {
        for op in batch.operations()? {
            Self::check_sizes(op)?;
        }
        if batch.is_empty() {
            return Ok(());
        }

        let mut writer = self.writer.lock();
        writer.check_usable()?;

        let first = self.last_sequence.load(Ordering::Acquire) + 1;
        let last = first + batch.count() as u64 - 1;
        if last > MAX_SEQUENCE_NUMBER {
            return Err(ScrollError::InvalidArgument(
                "sequence numbers exhausted".to_string(),
            ));
        }
        batch.set_sequence(first);

        // Step 1: Write to WAL first (durability guarantee)
        if let Err(err) = self.append_to_log(&mut writer, batch.contents()) {
            writer.fail(&err);
            return Err(err);
        }

        // Step 2: Write to MemTable, then publish
        let mem = Arc::clone(&self.mem.read());
        if let Err(err) = batch.insert_into(&mem) {
            writer.fail(&err);
            return Err(err);
        }
        self.last_sequence.store(last, Ordering::Release);

        // Step 3: Rotate if the MemTable is full
        if mem.approximate_memory_usage() > self.config.write_buffer_size {
            self.rotate_memtable();
        }

        Ok(())
    }

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(&mut batch)
    }

    /// Delete a key
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(&mut batch)
    }

    /// Force every logged batch to stable storage
    pub fn sync(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.check_usable()?;
        if let Err(err) = writer.wal.sync() {
            writer.fail(&err);
            return Err(err);
        }
        writer.unsynced = 0;
        Ok(())
    }

    /// Close the engine gracefully
    ///
    /// Syncs the WAL so every accepted write survives a restart
    pub fn close(self) -> Result<()> {
        self.sync()?;
        info!(
            data_dir = %self.config.data_dir.display(),
            last_sequence = self.last_sequence(),
            "engine closed"
        );
        Ok(())
    }

    fn check_sizes(op: Operation<'_>) -> Result<()> {
        if op.key().len() + TAG_SIZE > u32::MAX as usize {
            return Err(ScrollError::InvalidArgument(format!(
                "key of {} bytes is too large",
                op.key().len()
            )));
        }
        if let Operation::Put { value, .. } = op {
            if value.len() > u32::MAX as usize {
                return Err(ScrollError::InvalidArgument(format!(
                    "value of {} bytes is too large",
                    value.len()
                )));
            }
        }
        Ok(())
    }

    fn append_to_log(&self, writer: &mut WriterState, record: &[u8]) -> Result<()> {
        writer.wal.add_record(record)?;
        writer.unsynced += 1;
        if self.sync_due(writer.unsynced) {
            writer.wal.sync()?;
            writer.unsynced = 0;
        }
        Ok(())
    }

    fn sync_due(&self, unsynced: usize) -> bool {
        match self.config.wal_sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => unsynced >= count,
        }
    }

    /// Swap in an empty MemTable (called with the writer lock held)
    fn rotate_memtable(&self) {
        let old = self.memtable();
        debug!(
            entries = old.entry_count(),
            bytes = old.approximate_memory_usage(),
            immutable = self.immutable_count() + 1,
            "rotating memtable"
        );
        // Readers look in `mem` before `imm`: the old table must be in `imm`
        // before it leaves `mem`.
        self.imm.write().insert(0, old);
        *self.mem.write() = Arc::new(MemTable::new(self.comparator.clone()));
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get the newest value of `key`
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.get_at(key, self.last_sequence())
    }

    /// Get the value of `key` as of `sequence`
    ///
    /// Search order: active MemTable, then rotated MemTables newest to
    /// oldest. A tombstone ends the search.
    pub fn get_at(&self, key: &[u8], sequence: SequenceNumber) -> Option<Vec<u8>> {
        let lookup = LookupKey::new(key, sequence.min(MAX_SEQUENCE_NUMBER));

        let mem = Arc::clone(&self.mem.read());
        match mem.get(&lookup) {
            LookupResult::Found(value) => return Some(value),
            LookupResult::Deleted => return None,
            LookupResult::NotFound => {}
        }

        for table in self.imm.read().iter() {
            match table.get(&lookup) {
                LookupResult::Found(value) => return Some(value),
                LookupResult::Deleted => return None,
                LookupResult::NotFound => {}
            }
        }
        None
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Sequence number of the newest applied write
    pub fn last_sequence(&self) -> SequenceNumber {
        self.last_sequence.load(Ordering::Acquire)
    }

    /// The MemTable currently receiving writes
    pub fn memtable(&self) -> Arc<MemTable> {
        Arc::clone(&self.mem.read())
    }

    /// Rotated MemTables, newest first
    pub fn immutable_memtables(&self) -> Vec<Arc<MemTable>> {
        self.imm.read().clone()
    }

    pub fn immutable_count(&self) -> usize {
        self.imm.read().len()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Path of the write-ahead log
    pub fn wal_path(&self) -> &Path {
        &self.wal_path
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
