//! In-memory store, used for dry runs and tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{BatchToken, Store};
use crate::error::{EmstoreError, Result};

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    commits: Vec<usize>,
    closed: bool,
    fail_after: Option<usize>,
}

/// Ordered in-memory map that records every commit.
///
/// Clones share the same contents, so a caller can keep a handle and inspect
/// the store after a build has closed it.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose commits fail once `commits` have succeeded.
    pub fn failing_after(commits: usize) -> Self {
        let store = Self::default();
        if let Ok(mut state) = store.state.lock() {
            state.fail_after = Some(commits);
        }
        store
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| EmstoreError::Write("memory store lock poisoned".to_string()))
    }

    /// Look up a committed value.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.state().ok()?.entries.get(key).cloned()
    }

    /// Number of committed keys.
    pub fn len(&self) -> usize {
        self.state().map(|s| s.entries.len()).unwrap_or_default()
    }

    /// Whether nothing has been committed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Committed keys in store order.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.state()
            .map(|s| s.entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Size of each successful commit, in order.
    pub fn commit_sizes(&self) -> Vec<usize> {
        self.state()
            .map(|s| s.commits.clone())
            .unwrap_or_default()
    }

    /// Whether [`Store::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.state().map(|s| s.closed).unwrap_or_default()
    }
}

/// Puts queued for a [`MemoryStore`] commit.
#[derive(Debug, Default)]
pub struct MemoryBatch {
    puts: Vec<(Vec<u8>, Vec<u8>)>,
}

impl BatchToken for MemoryBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.puts.push((key.to_vec(), value.to_vec()));
    }

    fn len(&self) -> usize {
        self.puts.len()
    }
}

impl Store for MemoryStore {
    type Batch = MemoryBatch;

    fn write_batch(&self) -> MemoryBatch {
        MemoryBatch::default()
    }

    fn commit(&mut self, batch: MemoryBatch) -> Result<()> {
        let mut state = self.state()?;
        if state.closed {
            return Err(EmstoreError::Write("store is closed".to_string()));
        }
        if state.fail_after.is_some_and(|limit| state.commits.len() >= limit) {
            return Err(EmstoreError::Write("injected commit failure".to_string()));
        }

        state.commits.push(batch.puts.len());
        state.entries.extend(batch.puts);
        Ok(())
    }

    fn close(self) -> Result<()> {
        let mut state = self.state()?;
        if state.closed {
            return Err(EmstoreError::Write("store closed twice".to_string()));
        }
        state.closed = true;
        Ok(())
    }
}
