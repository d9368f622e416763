//! Engine Module
//!
//! The embedded key-value engine behind the storage adapter.
//!
//! ## Contract
//! Engines expose a narrow, synchronous surface and carry no locks of their
//! own: reads take `&self`, mutations take `&mut self`, so whoever owns the
//! engine decides how access is serialised (see [`crate::storage::KvStore`]).
//!
//! Every call returns a tagged [`StoreResult`]; a missing key is
//! [`StoreError::NotFound`](crate::error::StoreError::NotFound), and any call
//! made after [`StorageEngine::close`] fails with
//! [`StoreError::Closed`](crate::error::StoreError::Closed).

mod memory;
mod wal_engine;

pub use memory::MemoryEngine;
pub use wal_engine::WalEngine;

use crate::config::{StorageConfig, StorageKind};
use crate::error::StoreResult;

/// Visitor applied by [`StorageEngine::fold`]; return `false` to stop early
pub type Visitor<'a> = dyn FnMut(&[u8], &[u8]) -> bool + 'a;

/// The storage engine contract
pub trait StorageEngine: Send + Sync {
    /// Value stored under `key`
    fn get(&self, key: &[u8]) -> StoreResult<Vec<u8>>;

    /// Insert or overwrite `key`
    fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Remove `key`, reporting `NotFound` if it was absent
    fn delete(&mut self, key: &[u8]) -> StoreResult<()>;

    /// Apply `visitor` to every record until it returns `false`
    fn fold(&self, visitor: &mut Visitor<'_>) -> StoreResult<()>;

    /// All keys currently stored
    fn list_keys(&self) -> StoreResult<Vec<Vec<u8>>>;

    /// Flush pending writes to durable storage
    fn sync(&mut self) -> StoreResult<()>;

    /// Release the underlying handle
    fn close(&mut self) -> StoreResult<()>;
}

/// Open the engine selected by the storage configuration
pub fn open(config: &StorageConfig) -> StoreResult<Box<dyn StorageEngine>> {
    match config.kind {
        StorageKind::Wal => {
            let engine = WalEngine::open(&config.path, config.sync, config.cache_size * 1024)?;
            Ok(Box::new(engine))
        }
        StorageKind::Memory => Ok(Box::new(MemoryEngine::new())),
    }
}
