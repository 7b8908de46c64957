//! Several producers feeding one store.
//!
//! [`SharedWriter`] owns the only [`BatchCommitWriter`] for a destination and
//! serializes producers behind a mutex held for one whole ingest call. A call
//! either hands all of its accepted pairs to the writer or none of them.

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use tracing::{info, warn};

use crate::codec;
use crate::config::MalformedPolicy;
use crate::error::{EmstoreError, Result};
use crate::store::Store;
use crate::writer::{BatchCommitWriter, EncodedRecord, WriterStats};

/// Outcome of one [`SharedWriter::ingest`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Pairs encoded and committed.
    pub accepted: usize,

    /// Pairs dropped under [`MalformedPolicy::Skip`].
    pub skipped: usize,
}

/// A batch writer shared between producer threads.
pub struct SharedWriter<S: Store> {
    writer: Mutex<BatchCommitWriter<S>>,
    vector_size: usize,
    policy: MalformedPolicy,
}

impl<S: Store> SharedWriter<S> {
    /// Share `writer`, encoding every vector at `vector_size`.
    pub fn new(writer: BatchCommitWriter<S>, vector_size: usize, policy: MalformedPolicy) -> Self {
        Self {
            writer: Mutex::new(writer),
            vector_size,
            policy,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BatchCommitWriter<S>>> {
        self.writer
            .lock()
            .map_err(|_| EmstoreError::Write("shared writer lock poisoned".to_string()))
    }

    /// Encode and commit parallel lists of keys and vectors.
    ///
    /// Everything handed over is committed before the call returns.
    pub fn ingest<K, V>(&self, keys: &[K], vectors: &[V]) -> Result<IngestReport>
    where
        K: AsRef<[u8]>,
        V: AsRef<[f32]>,
    {
        if keys.len() != vectors.len() {
            return Err(EmstoreError::Config(format!(
                "{} keys but {} vectors",
                keys.len(),
                vectors.len()
            )));
        }

        let started = Instant::now();
        let mut report = IngestReport::default();
        let mut writer = self.lock()?;

        // Encode the whole call first so an aborted call leaves nothing behind.
        let mut encoded = Vec::with_capacity(keys.len());
        for (key, vector) in keys.iter().zip(vectors) {
            match codec::encode(vector.as_ref(), self.vector_size) {
                Ok(value) => encoded.push(EncodedRecord {
                    key: key.as_ref().to_vec(),
                    value,
                }),
                Err(e) if self.policy == MalformedPolicy::Skip => {
                    warn!(
                        "Skipping vector for key {}: {e}",
                        String::from_utf8_lossy(key.as_ref())
                    );
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        for record in encoded {
            writer.append(record)?;
            report.accepted += 1;
        }
        writer.flush()?;

        info!(
            "Ingested {} vectors ({} skipped) in {:?}",
            report.accepted,
            report.skipped,
            started.elapsed()
        );
        Ok(report)
    }

    /// Counters of the underlying writer.
    pub fn stats(&self) -> Result<WriterStats> {
        Ok(self.lock()?.stats())
    }

    /// Close the underlying writer and its store.
    pub fn close(self) -> Result<WriterStats> {
        self.writer
            .into_inner()
            .map_err(|_| EmstoreError::Write("shared writer lock poisoned".to_string()))?
            .close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_concurrent_producers() {
        let store = MemoryStore::new();
        let shared = Arc::new(SharedWriter::new(
            BatchCommitWriter::new(store.clone(), 4),
            3,
            MalformedPolicy::Skip,
        ));

        let handles: Vec<_> = (0..4)
            .map(|producer| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    let keys: Vec<String> =
                        (0..10).map(|i| format!("p{producer}-{i}")).collect();
                    let vectors = vec![vec![0.5f32, -0.5, 1.0]; 10];
                    shared.ingest(&keys, &vectors).unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().accepted, 10);
        }

        let shared = Arc::try_unwrap(shared).ok().unwrap();
        let stats = shared.close().unwrap();
        assert_eq!(stats.records_committed, 40);
        assert_eq!(store.len(), 40);
    }

    #[test]
    fn test_wrong_size_vectors_follow_policy() {
        let store = MemoryStore::new();
        let shared = SharedWriter::new(
            BatchCommitWriter::new(store.clone(), 8),
            2,
            MalformedPolicy::Skip,
        );
        let report = shared
            .ingest(&["a", "b"], &[vec![1.0f32, 2.0], vec![1.0]])
            .unwrap();
        assert_eq!(
            report,
            IngestReport {
                accepted: 1,
                skipped: 1
            }
        );

        let strict = SharedWriter::new(
            BatchCommitWriter::new(MemoryStore::new(), 8),
            2,
            MalformedPolicy::Abort,
        );
        assert!(matches!(
            strict.ingest(&["a"], &[vec![1.0f32]]),
            Err(EmstoreError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_aborted_call_leaves_nothing_for_the_next_one() {
        let store = MemoryStore::new();
        let shared = SharedWriter::new(
            BatchCommitWriter::new(store.clone(), 8),
            2,
            MalformedPolicy::Abort,
        );

        assert!(
            shared
                .ingest(&["a", "bad"], &[vec![1.0f32, 2.0], vec![1.0]])
                .is_err()
        );
        shared.ingest(&["c"], &[vec![3.0f32, 4.0]]).unwrap();

        assert_eq!(store.keys(), vec![b"c".to_vec()]);
        assert_eq!(shared.stats().unwrap().records_committed, 1);
    }

    #[test]
    fn test_non_finite_vectors_follow_policy() {
        let store = MemoryStore::new();
        let shared = SharedWriter::new(
            BatchCommitWriter::new(store.clone(), 8),
            2,
            MalformedPolicy::Skip,
        );
        let report = shared
            .ingest(
                &["n", "i", "ok"],
                &[
                    vec![f32::NAN, 1.0],
                    vec![f32::INFINITY, 1.0],
                    vec![0.5, 1.0],
                ],
            )
            .unwrap();

        assert_eq!(
            report,
            IngestReport {
                accepted: 1,
                skipped: 2
            }
        );
        assert_eq!(store.keys(), vec![b"ok".to_vec()]);
    }

    #[test]
    fn test_mismatched_lists() {
        let shared = SharedWriter::new(
            BatchCommitWriter::new(MemoryStore::new(), 8),
            1,
            MalformedPolicy::Skip,
        );
        assert!(shared.ingest(&["a", "b"], &[vec![1.0f32]]).is_err());
    }
}
