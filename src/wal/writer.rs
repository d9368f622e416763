//! WAL Writer
//!
//! Handles appending entries to the WAL file.
//!
//! ## Failure handling
//! An append either lands a whole entry or leaves the file as it was:
//! - a failed write truncates the file back to the end of the last complete
//!   entry, and the writer stays usable
//! - a failed fsync also removes the entry being appended, then disables the
//!   writer; after a failed fsync the page cache state is unknown
//! - if the truncation itself fails, the writer is disabled
//!
//! A disabled writer answers [`StoreError::WriterFailed`] to every call.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{StoreError, StoreResult};

use super::{Operation, WalEntry};

/// Appends entries to a WAL file
pub struct WalWriter {
    /// Path of the log file (for diagnostics)
    path: PathBuf,

    /// Buffered handle; `None` once the writer has been disabled
    writer: Option<BufWriter<File>>,

    /// File length up to the end of the last complete entry
    committed_len: u64,

    buffer_bytes: usize,

    /// LSN assigned to the next appended entry
    next_lsn: u64,

    sync_strategy: WalSyncStrategy,

    /// Entries appended since the last fsync
    unsynced: usize,
}

impl WalWriter {
    /// Open or create a WAL file for appending
    ///
    /// `next_lsn` continues the sequence found during recovery; `buffer_bytes`
    /// sizes the in-process write buffer.
    pub fn open(
        path: &Path,
        sync_strategy: WalSyncStrategy,
        buffer_bytes: usize,
        next_lsn: u64,
    ) -> StoreResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let committed_len = file.metadata()?.len();
        Ok(Self::from_file(path, file, committed_len, sync_strategy, buffer_bytes, next_lsn))
    }

    /// Create a fresh, empty WAL file (truncating anything already there)
    pub fn create(path: &Path, sync_strategy: WalSyncStrategy, buffer_bytes: usize) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::from_file(path, file, 0, sync_strategy, buffer_bytes, 1))
    }

    fn from_file(
        path: &Path,
        file: File,
        committed_len: u64,
        sync_strategy: WalSyncStrategy,
        buffer_bytes: usize,
        next_lsn: u64,
    ) -> Self {
        let buffer_bytes = buffer_bytes.max(4096);
        Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::with_capacity(buffer_bytes, file)),
            committed_len,
            buffer_bytes,
            next_lsn: next_lsn.max(1),
            sync_strategy,
            unsynced: 0,
        }
    }

    /// Append an operation, returning its LSN
    ///
    /// The entry is handed to the OS before returning; whether it is also
    /// fsynced depends on the sync strategy. On error the entry is not in
    /// the log.
    pub fn append(&mut self, operation: Operation) -> StoreResult<u64> {
        let lsn = self.next_lsn;
        let bytes = WalEntry::new(lsn, operation).serialize()?;
        let writer = self.writer.as_mut().ok_or(StoreError::WriterFailed)?;

        if let Err(e) = writer.write_all(&bytes).and_then(|()| writer.flush()) {
            tracing::error!(path = %self.path.display(), lsn, error = %e, "WAL write failed");
            self.roll_back();
            return Err(e.into());
        }

        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced + 1 >= count.max(1),
        };
        if due {
            if let Err(e) = self.fsync() {
                tracing::error!(path = %self.path.display(), lsn, error = %e, "WAL fsync failed");
                self.roll_back();
                self.writer = None;
                return Err(e);
            }
        } else {
            self.unsynced += 1;
        }

        self.committed_len += bytes.len() as u64;
        self.next_lsn += 1;
        Ok(lsn)
    }

    /// Force sync to disk; a failure disables the writer
    pub fn sync(&mut self) -> StoreResult<()> {
        if let Err(e) = self.fsync() {
            if self.writer.take().is_some() {
                tracing::error!(path = %self.path.display(), error = %e, "WAL fsync failed, writer disabled");
            }
            return Err(e);
        }
        Ok(())
    }

    fn fsync(&mut self) -> StoreResult<()> {
        let writer = self.writer.as_mut().ok_or(StoreError::WriterFailed)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Drop buffered bytes and cut the file back to `committed_len`
    fn roll_back(&mut self) {
        let Some(writer) = self.writer.take() else {
            return;
        };
        let (mut file, _unwritten) = writer.into_parts();

        let restored = file
            .set_len(self.committed_len)
            .and_then(|()| file.seek(SeekFrom::Start(self.committed_len)));
        match restored {
            Ok(_) => {
                self.writer = Some(BufWriter::with_capacity(self.buffer_bytes, file));
            }
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    committed_len = self.committed_len,
                    error = %e,
                    "could not undo partial WAL write, writer disabled"
                );
            }
        }
    }

    /// LSN the next append will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Entries written but not yet fsynced
    pub fn unsynced(&self) -> usize {
        self.unsynced
    }

    /// Whether a failure has disabled the writer
    pub fn is_failed(&self) -> bool {
        self.writer.is_none()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
