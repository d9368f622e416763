//! Volatile engine backed by a `BTreeMap`.

use std::collections::BTreeMap;

use crate::error::{StoreError, StoreResult};

use super::{StorageEngine, Visitor};

/// In-memory engine; contents are lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryEngine {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    closed: bool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl StorageEngine for MemoryEngine {
    fn get(&self, key: &[u8]) -> StoreResult<Vec<u8>> {
        self.ensure_open()?;
        self.data.get(key).cloned().ok_or(StoreError::NotFound)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.ensure_open()?;
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        self.ensure_open()?;
        self.data.remove(key).map(|_| ()).ok_or(StoreError::NotFound)
    }

    fn fold(&self, visitor: &mut Visitor<'_>) -> StoreResult<()> {
        self.ensure_open()?;
        for (key, value) in &self.data {
            if !visitor(key, value) {
                break;
            }
        }
        Ok(())
    }

    fn list_keys(&self) -> StoreResult<Vec<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.data.keys().cloned().collect())
    }

    fn sync(&mut self) -> StoreResult<()> {
        self.ensure_open()
    }

    fn close(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        self.closed = true;
        Ok(())
    }
}
