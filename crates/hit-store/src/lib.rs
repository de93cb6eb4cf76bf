//! # Hit Store
//!
//! Crash-safe, insertion-ordered storage for queued hits.
//!
//! ## Guarantees
//!
//! - `append` returns only after the record is on stable storage
//! - Readers never observe a partially written record
//! - Records leave the store only through `remove_oldest` or `clear`
//!
//! ## Backends
//!
//! - [`SqliteHitStore`] - the durable backend, one SQLite file per queue
//! - [`MemoryHitStore`] - same contract without persistence (tests, fallback)
//!
//! ```rust
//! use hit_store::{HitStore, MemoryHitStore};
//!
//! let store = MemoryHitStore::new();
//! let id = store.append("asset", r#"{"url":"https://a"}"#).unwrap();
//! assert_eq!(store.peek_oldest().unwrap().unwrap().id, id);
//! store.remove_oldest().unwrap();
//! assert_eq!(store.count().unwrap(), 0);
//! ```

mod error;
mod memory;
mod record;
mod sqlite;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryHitStore;
pub use record::HitRecord;
pub use sqlite::SqliteHitStore;

/// Insertion-ordered durable record storage.
///
/// Implementations are shared across tasks, so every method takes `&self`
/// and serializes access internally.
pub trait HitStore: Send + Sync {
    /// Appends a payload and returns the generated record id.
    ///
    /// The record is durable once this returns `Ok`.
    fn append(&self, kind: &str, payload: &str) -> StoreResult<String>;

    /// Returns the oldest record without removing it.
    fn peek_oldest(&self) -> StoreResult<Option<HitRecord>>;

    /// Returns up to `limit` records, oldest first, without removing them.
    fn peek_batch(&self, limit: usize) -> StoreResult<Vec<HitRecord>>;

    /// Replaces the payload of an existing record, keeping its position.
    fn update_payload(&self, id: &str, payload: &str) -> StoreResult<()>;

    /// Removes the oldest record. Removing from an empty store is a no-op.
    fn remove_oldest(&self) -> StoreResult<()>;

    /// Removes every record.
    fn clear(&self) -> StoreResult<()>;

    /// Number of records currently stored.
    fn count(&self) -> StoreResult<usize>;

    /// Releases underlying handles. Records stay on disk. The default does
    /// nothing.
    fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

impl<S: HitStore + ?Sized> HitStore for Box<S> {
    fn append(&self, kind: &str, payload: &str) -> StoreResult<String> {
        (**self).append(kind, payload)
    }

    fn peek_oldest(&self) -> StoreResult<Option<HitRecord>> {
        (**self).peek_oldest()
    }

    fn peek_batch(&self, limit: usize) -> StoreResult<Vec<HitRecord>> {
        (**self).peek_batch(limit)
    }

    fn update_payload(&self, id: &str, payload: &str) -> StoreResult<()> {
        (**self).update_payload(id, payload)
    }

    fn remove_oldest(&self) -> StoreResult<()> {
        (**self).remove_oldest()
    }

    fn clear(&self) -> StoreResult<()> {
        (**self).clear()
    }

    fn count(&self) -> StoreResult<usize> {
        (**self).count()
    }

    fn close(&self) -> StoreResult<()> {
        (**self).close()
    }
}
