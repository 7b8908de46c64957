//! Batched commits into a store.
//!
//! Records are buffered in a [`Batch`] and committed once it is full, which
//! keeps at most one batch in memory no matter how large the corpus is.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::{BatchToken, Store};

/// A key and its encoded vector, ready for the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRecord {
    /// Store key.
    pub key: Vec<u8>,

    /// Packed vector.
    pub value: Vec<u8>,
}

/// Records accumulated since the last commit.
#[derive(Debug)]
pub struct Batch {
    records: Vec<EncodedRecord>,
    capacity: usize,
}

impl Batch {
    /// Create an empty batch holding up to `capacity` records.
    ///
    /// Storage grows with the records pushed, not with `capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Add a record.
    pub fn push(&mut self, record: EncodedRecord) {
        self.records.push(record);
    }

    /// Whether the batch has reached its capacity.
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of records before a commit.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn take(&mut self) -> Vec<EncodedRecord> {
        std::mem::take(&mut self.records)
    }
}

/// Counters kept by a [`BatchCommitWriter`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriterStats {
    /// Records committed to the store.
    pub records_committed: u64,

    /// Successful batch commits.
    pub commits: u64,

    /// Records dropped because their commit failed or the writer was abandoned.
    pub records_lost: u64,

    /// Time since the writer was created.
    pub elapsed: Duration,
}

/// Groups encoded records into fixed-size store commits.
pub struct BatchCommitWriter<S: Store> {
    store: S,
    batch: Batch,
    stats: WriterStats,
    started: Instant,
}

impl<S: Store> BatchCommitWriter<S> {
    /// Create a writer committing `batch_capacity` records at a time.
    pub fn new(store: S, batch_capacity: usize) -> Self {
        Self {
            store,
            batch: Batch::new(batch_capacity),
            stats: WriterStats::default(),
            started: Instant::now(),
        }
    }

    /// Buffer a record, committing the batch once it is full.
    pub fn append(&mut self, record: EncodedRecord) -> Result<()> {
        self.batch.push(record);
        if self.batch.is_full() {
            self.flush()?;
        }
        Ok(())
    }

    /// Commit the buffered records as one atomic write. No-op when empty.
    ///
    /// A failed commit is not retried and its records are counted as lost.
    pub fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let records = self.batch.take();
        let count = records.len() as u64;
        let mut token = self.store.write_batch();
        for record in &records {
            token.put(&record.key, &record.value);
        }

        if let Err(e) = self.store.commit(token) {
            self.stats.records_lost += count;
            return Err(e);
        }

        self.stats.records_committed += count;
        self.stats.commits += 1;
        debug!(
            "Committed batch of {count} records ({} total)",
            self.stats.records_committed
        );
        Ok(())
    }

    /// Commit the trailing partial batch and close the store.
    ///
    /// The store is closed even when the final commit fails.
    pub fn close(mut self) -> Result<WriterStats> {
        let flushed = self.flush();
        let closed = self.store.close();
        let mut stats = self.stats;
        stats.elapsed = self.started.elapsed();
        flushed?;
        closed?;

        info!(
            "Wrote {} records in {} commits ({:?})",
            stats.records_committed, stats.commits, stats.elapsed
        );
        Ok(stats)
    }

    /// Drop buffered records and close the store without a final commit.
    pub fn abandon(mut self) -> Result<WriterStats> {
        let dropped = self.batch.len() as u64;
        if dropped > 0 {
            warn!("Discarding {dropped} uncommitted records");
        }
        self.stats.records_lost += dropped;
        self.stats.elapsed = self.started.elapsed();
        self.store.close()?;
        Ok(self.stats)
    }

    /// Number of buffered, uncommitted records.
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Counters so far.
    pub fn stats(&self) -> WriterStats {
        WriterStats {
            elapsed: self.started.elapsed(),
            ..self.stats.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn record(i: usize) -> EncodedRecord {
        EncodedRecord {
            key: format!("key-{i}").into_bytes(),
            value: vec![0x00, 0x3C],
        }
    }

    #[test]
    fn test_flush_boundaries() {
        let store = MemoryStore::new();
        let mut writer = BatchCommitWriter::new(store.clone(), 3);

        for i in 0..7 {
            writer.append(record(i)).unwrap();
        }
        assert_eq!(writer.pending(), 1);

        let stats = writer.close().unwrap();
        assert_eq!(store.commit_sizes(), vec![3, 3, 1]);
        assert_eq!(stats.records_committed, 7);
        assert_eq!(stats.commits, 3);
        assert!(store.is_closed());
    }

    #[test]
    fn test_empty_flush_is_noop() {
        let store = MemoryStore::new();
        let mut writer = BatchCommitWriter::new(store.clone(), 3);
        writer.flush().unwrap();
        writer.close().unwrap();
        assert!(store.commit_sizes().is_empty());
    }

    #[test]
    fn test_failed_commit_is_surfaced_and_lost() {
        let store = MemoryStore::failing_after(1);
        let mut writer = BatchCommitWriter::new(store.clone(), 2);

        writer.append(record(0)).unwrap();
        writer.append(record(1)).unwrap();
        writer.append(record(2)).unwrap();
        assert!(writer.append(record(3)).is_err());

        let stats = writer.stats();
        assert_eq!(stats.records_committed, 2);
        assert_eq!(stats.records_lost, 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_close_releases_store_after_failed_flush() {
        let store = MemoryStore::failing_after(0);
        let mut writer = BatchCommitWriter::new(store.clone(), 10);
        writer.append(record(0)).unwrap();

        assert!(writer.close().is_err());
        assert!(store.is_closed());
    }

    #[test]
    fn test_huge_capacity_allocates_lazily() {
        let store = MemoryStore::new();
        let mut writer = BatchCommitWriter::new(store.clone(), usize::MAX);
        writer.append(record(0)).unwrap();
        writer.append(record(1)).unwrap();

        let stats = writer.close().unwrap();
        assert_eq!(stats.records_committed, 2);
        assert_eq!(store.commit_sizes(), vec![2]);
    }

    #[test]
    fn test_abandon_discards_pending() {
        let store = MemoryStore::new();
        let mut writer = BatchCommitWriter::new(store.clone(), 10);
        writer.append(record(0)).unwrap();

        let stats = writer.abandon().unwrap();
        assert_eq!(stats.records_lost, 1);
        assert!(store.is_empty());
        assert!(store.is_closed());
    }
}
