//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their byte codec.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// LSN (8) + CRC (4) + payload length (4)
pub const HEADER_SIZE: usize = 16;

/// Upper bound on a single payload; anything larger is treated as corruption
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing within one log file
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl WalEntry {
    pub fn new(lsn: u64, operation: Operation) -> Self {
        Self { lsn, operation }
    }

    /// Encode header + payload
    pub fn serialize(&self) -> StoreResult<Vec<u8>> {
        let payload = bincode::serialize(&self.operation)?;
        if payload.len() as u64 > MAX_PAYLOAD_SIZE as u64 {
            return Err(StoreError::Serialization(format!(
                "entry payload of {} bytes exceeds limit of {} bytes",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        let crc = Self::checksum(self.lsn, &payload);

        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.extend_from_slice(&self.lsn.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Split a header into (lsn, crc, payload_len)
    pub fn parse_header(header: &[u8; HEADER_SIZE]) -> (u64, u32, u32) {
        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        lsn.copy_from_slice(&header[0..8]);
        crc.copy_from_slice(&header[8..12]);
        len.copy_from_slice(&header[12..16]);
        (
            u64::from_le_bytes(lsn),
            u32::from_le_bytes(crc),
            u32::from_le_bytes(len),
        )
    }

    /// Rebuild an entry from its parsed header fields and payload, verifying the CRC
    pub fn decode(lsn: u64, crc: u32, payload: &[u8]) -> StoreResult<Self> {
        let actual = Self::checksum(lsn, payload);
        if actual != crc {
            return Err(StoreError::Corruption(format!(
                "CRC mismatch at lsn {}: expected {:#010x}, got {:#010x}",
                lsn, crc, actual
            )));
        }

        let operation = bincode::deserialize(payload)
            .map_err(|e| StoreError::Corruption(format!("undecodable payload at lsn {}: {}", lsn, e)))?;
        Ok(Self { lsn, operation })
    }

    fn checksum(lsn: u64, payload: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&lsn.to_le_bytes());
        hasher.update(payload);
        hasher.finalize()
    }
}
