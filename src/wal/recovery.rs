//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::StoreResult;

use super::{ReadOutcome, WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries encountered (reading stops at the first)
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the WAL was truncated (torn or corrupt tail removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read entries until the end of file or the first invalid entry
    /// 2. Truncate the file after the last valid entry
    /// 3. Return all valid entries in order
    ///
    /// A missing file recovers as empty.
    pub fn recover(path: &Path) -> StoreResult<(Vec<WalEntry>, RecoveryResult)> {
        if !path.exists() {
            return Ok((Vec::new(), RecoveryResult::default()));
        }

        let (entries, mut result, valid_len) = Self::scan(path)?;

        let file_len = std::fs::metadata(path)?.len();
        if valid_len < file_len {
            tracing::warn!(
                path = %path.display(),
                valid_bytes = valid_len,
                dropped_bytes = file_len - valid_len,
                "truncating invalid WAL tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_len)?;
            file.sync_all()?;
            result.was_truncated = true;
        }

        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> StoreResult<RecoveryResult> {
        let (_, result, _) = Self::scan(path)?;
        Ok(result)
    }

    fn scan(path: &Path) -> StoreResult<(Vec<WalEntry>, RecoveryResult, u64)> {
        let mut reader = WalReader::open(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();
        let mut valid_len = 0;

        loop {
            match reader.next_entry()? {
                ReadOutcome::Entry(entry) => {
                    if entry.lsn <= result.last_lsn {
                        tracing::warn!(lsn = entry.lsn, previous = result.last_lsn, "non-monotonic LSN in WAL");
                        result.entries_corrupted += 1;
                        break;
                    }
                    result.last_lsn = entry.lsn;
                    result.entries_recovered += 1;
                    valid_len = reader.position();
                    entries.push(entry);
                }
                ReadOutcome::End => break,
                ReadOutcome::Torn => {
                    tracing::warn!(path = %path.display(), "torn entry at end of WAL");
                    break;
                }
                ReadOutcome::Corrupt(reason) => {
                    tracing::warn!(path = %path.display(), %reason, "corrupt WAL entry");
                    result.entries_corrupted += 1;
                    break;
                }
            }
        }

        Ok((entries, result, valid_len))
    }
}
