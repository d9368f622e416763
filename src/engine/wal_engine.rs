//! WAL-backed engine
//!
//! ## Layout
//! ```text
//!   {data_dir}/
//!     ├── kv.wal           (write-ahead log, the only durable state)
//!     └── kv.wal.compact   (transient, exists only while compacting)
//! ```
//!
//! The live data set is an ordered in-memory index rebuilt at open by
//! replaying the log. Every mutation is appended to the log before it is
//! applied to the index.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{StoreError, StoreResult};
use crate::wal::{Operation, WalRecovery, WalWriter};

use super::{StorageEngine, Visitor};

/// Logs with fewer records than this are never compacted
const COMPACTION_FLOOR: u64 = 1024;

/// Persistent engine: ordered index + append-only log
pub struct WalEngine {
    data_dir: PathBuf,

    /// Live key/value pairs
    index: BTreeMap<Vec<u8>, Vec<u8>>,

    /// `None` once the engine has been closed
    wal: Option<WalWriter>,

    sync_strategy: WalSyncStrategy,
    buffer_bytes: usize,
}

impl WalEngine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "kv.wal";
    const COMPACT_FILENAME: &'static str = "kv.wal.compact";

    /// Open or create an engine rooted at `data_dir`
    ///
    /// On startup:
    /// 1. Create the data directory
    /// 2. Recover the log (truncating a torn or corrupt tail)
    /// 3. Replay entries into the index
    /// 4. Compact the log if it is mostly dead records
    pub fn open(data_dir: &Path, sync_strategy: WalSyncStrategy, buffer_bytes: usize) -> StoreResult<Self> {
        fs::create_dir_all(data_dir)?;
        let wal_path = data_dir.join(Self::WAL_FILENAME);

        // A leftover compaction file means a compaction never reached its rename
        let stale = data_dir.join(Self::COMPACT_FILENAME);
        if stale.exists() {
            tracing::warn!(path = %stale.display(), "removing unfinished compaction file");
            fs::remove_file(&stale)?;
        }

        let (entries, recovery) = WalRecovery::recover(&wal_path)?;
        if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
            tracing::info!(
                recovered = recovery.entries_recovered,
                corrupted = recovery.entries_corrupted,
                last_lsn = recovery.last_lsn,
                truncated = recovery.was_truncated,
                "WAL recovery complete"
            );
        }

        let mut index = BTreeMap::new();
        for entry in entries {
            match entry.operation {
                Operation::Put { key, value } => {
                    index.insert(key, value);
                }
                Operation::Delete { key } => {
                    index.remove(&key);
                }
            }
        }

        let mut engine = Self {
            data_dir: data_dir.to_path_buf(),
            index,
            wal: None,
            sync_strategy,
            buffer_bytes,
        };

        let records = recovery.entries_recovered;
        if records >= COMPACTION_FLOOR && records >= 2 * engine.index.len() as u64 {
            engine.rewrite_log()?;
        } else {
            engine.wal = Some(WalWriter::open(
                &wal_path,
                sync_strategy,
                buffer_bytes,
                recovery.last_lsn + 1,
            )?);
        }

        Ok(engine)
    }

    /// Rewrite the log so it holds exactly one `Put` per live key
    ///
    /// The new log is fully written and fsynced under a temporary name, then
    /// renamed over the old one.
    pub fn compact(&mut self) -> StoreResult<()> {
        // Drop the current handle first so nothing is appended to the old log
        let mut wal = self.wal.take().ok_or(StoreError::Closed)?;
        wal.sync()?;
        drop(wal);

        self.rewrite_log()
    }

    fn rewrite_log(&mut self) -> StoreResult<()> {
        let wal_path = self.wal_path();
        let compact_path = self.data_dir.join(Self::COMPACT_FILENAME);

        {
            let mut writer = WalWriter::create(
                &compact_path,
                WalSyncStrategy::EveryNEntries { count: usize::MAX },
                self.buffer_bytes,
            )?;
            for (key, value) in &self.index {
                writer.append(Operation::Put {
                    key: key.clone(),
                    value: value.clone(),
                })?;
            }
            writer.sync()?;
        }

        fs::rename(&compact_path, &wal_path)?;
        if let Ok(dir) = fs::File::open(&self.data_dir) {
            // Persist the rename; not every platform supports syncing a directory
            let _ = dir.sync_all();
        }

        let next_lsn = self.index.len() as u64 + 1;
        self.wal = Some(WalWriter::open(
            &wal_path,
            self.sync_strategy,
            self.buffer_bytes,
            next_lsn,
        )?);

        tracing::info!(live_keys = self.index.len(), "WAL compacted");
        Ok(())
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the write-ahead log
    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(Self::WAL_FILENAME)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn writer(&mut self) -> StoreResult<&mut WalWriter> {
        self.wal.as_mut().ok_or(StoreError::Closed)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.wal.is_none() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl StorageEngine for WalEngine {
    fn get(&self, key: &[u8]) -> StoreResult<Vec<u8>> {
        self.ensure_open()?;
        self.index.get(key).cloned().ok_or(StoreError::NotFound)
    }

    /// Log first, then apply to the index
    fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.writer()?.append(Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })?;
        self.index.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    /// Absent keys are rejected before anything is logged
    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        self.ensure_open()?;
        if !self.index.contains_key(key) {
            return Err(StoreError::NotFound);
        }
        self.writer()?.append(Operation::Delete { key: key.to_vec() })?;
        self.index.remove(key);
        Ok(())
    }

    fn fold(&self, visitor: &mut Visitor<'_>) -> StoreResult<()> {
        self.ensure_open()?;
        for (key, value) in &self.index {
            if !visitor(key, value) {
                break;
            }
        }
        Ok(())
    }

    fn list_keys(&self) -> StoreResult<Vec<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.index.keys().cloned().collect())
    }

    fn sync(&mut self) -> StoreResult<()> {
        self.writer()?.sync()
    }

    /// Sync and release the log; the index stays in memory but is unreachable
    fn close(&mut self) -> StoreResult<()> {
        let mut wal = self.wal.take().ok_or(StoreError::Closed)?;
        wal.sync()?;
        tracing::debug!(path = %wal.path().display(), "WAL closed");
        Ok(())
    }
}
