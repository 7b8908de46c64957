//! RocksDB-backed store.

use std::path::{Path, PathBuf};

use rocksdb::{BlockBasedOptions, Cache, DB, Options, WriteBatch};
use tracing::info;

use super::{BatchToken, Store};
use crate::config::StoreOptions;
use crate::error::{EmstoreError, Result};

/// A RocksDB database holding encoded vectors.
pub struct RocksStore {
    db: DB,
    /// Block cache, kept alive for the lifetime of the database.
    _cache: Option<Cache>,
    path: PathBuf,
}

impl RocksStore {
    /// Open (or create) a database at `path`.
    pub fn open(path: impl AsRef<Path>, options: &StoreOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_block_size(options.block_size);
        let cache = if options.cache_size > 0 {
            let cache = Cache::new_lru_cache(options.cache_size);
            block_opts.set_block_cache(&cache);
            Some(cache)
        } else {
            block_opts.disable_cache();
            None
        };
        if options.filter_bits > 0 {
            block_opts.set_bloom_filter(f64::from(options.filter_bits), false);
        }

        let mut db_opts = Options::default();
        db_opts.create_if_missing(options.create_if_missing);
        db_opts.set_error_if_exists(options.error_if_exists);
        db_opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&db_opts, &path).map_err(|e| EmstoreError::Open {
            path: path.clone(),
            message: e.to_string(),
        })?;

        info!("Opened store at {}", path.display());
        Ok(Self {
            db,
            _cache: cache,
            path,
        })
    }

    /// Read back a stored value.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map_err(|e| EmstoreError::Read(format!("{}: {e}", self.path.display())))
    }

    /// Directory holding the database.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BatchToken for WriteBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        WriteBatch::put(self, key, value);
    }

    fn len(&self) -> usize {
        WriteBatch::len(self)
    }
}

impl Store for RocksStore {
    type Batch = WriteBatch;

    fn write_batch(&self) -> WriteBatch {
        WriteBatch::default()
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| EmstoreError::Write(e.to_string()))
    }

    fn close(self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| EmstoreError::Write(format!("flush on close failed: {e}")))?;
        info!("Closed store at {}", self.path.display());
        Ok(())
    }
}
