//! WAL Reader
//!
//! Sequentially decodes entries from a WAL file, classifying how reading
//! stopped so recovery can decide what to truncate.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{StoreError, StoreResult};

use super::{WalEntry, HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// What the reader found at the current position
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete entry with a valid checksum
    Entry(WalEntry),

    /// Clean end of file
    End,

    /// File ends in the middle of an entry (torn write)
    Torn,

    /// A complete entry that fails validation
    Corrupt(String),
}

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,

    /// Offset just past the last entry returned as `Entry`
    position: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> StoreResult<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
        })
    }

    /// Read the next entry from the WAL
    pub fn next_entry(&mut self) -> StoreResult<ReadOutcome> {
        let mut header = [0u8; HEADER_SIZE];
        match read_full(&mut self.reader, &mut header)? {
            0 => return Ok(ReadOutcome::End),
            n if n < HEADER_SIZE => return Ok(ReadOutcome::Torn),
            _ => {}
        }

        let (lsn, crc, len) = WalEntry::parse_header(&header);
        if len > MAX_PAYLOAD_SIZE {
            return Ok(ReadOutcome::Corrupt(format!(
                "payload length {} at lsn {} exceeds limit",
                len, lsn
            )));
        }

        let mut payload = vec![0u8; len as usize];
        if read_full(&mut self.reader, &mut payload)? < payload.len() {
            return Ok(ReadOutcome::Torn);
        }

        match WalEntry::decode(lsn, crc, &payload) {
            Ok(entry) => {
                self.position += (HEADER_SIZE + payload.len()) as u64;
                Ok(ReadOutcome::Entry(entry))
            }
            Err(StoreError::Corruption(reason)) => Ok(ReadOutcome::Corrupt(reason)),
            Err(e) => Err(e),
        }
    }

    /// Offset of the end of the last valid entry
    pub fn position(&self) -> u64 {
        self.position
    }
}

/// Fill `buf` as far as the file allows, returning how many bytes were read
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> StoreResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
