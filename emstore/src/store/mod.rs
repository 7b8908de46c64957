//! Ordered key-value stores the builder writes into.
//!
//! The builder only needs batched writes: a batch collects puts and is
//! committed as a single atomic operation by the store.

mod memory;
mod rocks;

pub use memory::{MemoryBatch, MemoryStore};
pub use rocks::RocksStore;

use crate::error::Result;

/// A group of puts committed together.
pub trait BatchToken {
    /// Queue a key/value pair.
    fn put(&mut self, key: &[u8], value: &[u8]);

    /// Number of queued pairs.
    fn len(&self) -> usize;

    /// Whether nothing has been queued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An opened store.
pub trait Store {
    /// Batch type accepted by [`Store::commit`].
    type Batch: BatchToken;

    /// Start an empty batch.
    fn write_batch(&self) -> Self::Batch;

    /// Apply every put in `batch` atomically.
    fn commit(&mut self, batch: Self::Batch) -> Result<()>;

    /// Persist outstanding state and release the store.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}
