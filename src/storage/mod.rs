//! Storage Module
//!
//! The storage adapter: a lock-guarded façade over one embedded engine handle.
//!
//! ## Responsibilities
//! - Own the engine handle exclusively for the process lifetime
//! - Mediate concurrent access with a single reader/writer lock
//! - Expose the engine contract unchanged (tagged results, no retries)
//!
//! ## Locking
//! ```text
//!   get / fold / list_keys      → shared   (concurrent with each other)
//!   put / delete / sync / close → exclusive (excludes everything)
//! ```

mod store;

pub use store::KvStore;
