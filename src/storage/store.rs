//! KvStore
//!
//! Lock-guarded adapter over a [`StorageEngine`].

use parking_lot::RwLock;

use crate::config::StorageConfig;
use crate::engine::{self, StorageEngine};
use crate::error::StoreResult;

/// Thread-safe façade over the engine handle
///
/// ## Concurrency:
/// - `engine`: one RwLock per adapter instance, the only synchronisation
/// - All methods use `&self`; share the adapter with `Arc<KvStore>`
///
/// ## Lifecycle:
/// `close` must be called at most once. Calls made after it reach the engine,
/// which answers `StoreError::Closed`; preventing such calls is the owner's job.
pub struct KvStore {
    engine: RwLock<Box<dyn StorageEngine>>,
}

impl KvStore {
    /// Wrap an already-open engine
    pub fn new(engine: Box<dyn StorageEngine>) -> Self {
        Self {
            engine: RwLock::new(engine),
        }
    }

    /// Open the engine selected by `config` and wrap it
    pub fn open(config: &StorageConfig) -> StoreResult<Self> {
        let engine = engine::open(config)?;
        tracing::info!(kind = ?config.kind, path = %config.path.display(), "storage engine opened");
        Ok(Self::new(engine))
    }

    // =========================================================================
    // Shared (read lock)
    // =========================================================================

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> StoreResult<Vec<u8>> {
        self.engine.read().get(key)
    }

    /// Visit every record until `visitor` returns `false`
    ///
    /// Traversal order is engine-defined. Writers are excluded for the whole
    /// traversal, so the visitor sees a consistent view.
    pub fn fold<F>(&self, mut visitor: F) -> StoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.engine.read().fold(&mut visitor)
    }

    /// All keys currently stored
    ///
    /// The lock is released on return, so the list may be stale by the time
    /// the caller looks values up.
    pub fn list_keys(&self) -> StoreResult<Vec<Vec<u8>>> {
        self.engine.read().list_keys()
    }

    /// Number of records, counted with `fold`
    pub fn count(&self) -> StoreResult<usize> {
        let mut count = 0;
        self.fold(|_, _| {
            count += 1;
            true
        })?;
        Ok(count)
    }

    // =========================================================================
    // Exclusive (write lock)
    // =========================================================================

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.engine.write().put(key, value)
    }

    /// Delete a key; `StoreError::NotFound` if it was absent
    pub fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.engine.write().delete(key)
    }

    /// Flush pending writes
    pub fn sync(&self) -> StoreResult<()> {
        self.engine.write().sync()
    }

    /// Release the engine handle
    pub fn close(&self) -> StoreResult<()> {
        self.engine.write().close()
    }
}
