//! RocksDB-backed [`KvStore`].
//!
//! A single default column family holds every table; tables are separated by
//! key prefix (see [`Table`](crate::storage::table::Table)).

use crate::info;
use crate::storage::storage_trait::{KvIter, KvStore, StorageError, WriteBatch};
use rocksdb::{DB, IteratorMode, Options, ReadOptions};
use std::path::{Path, PathBuf};

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::Backend(e.into_string())
    }
}

pub struct RocksDbStore {
    db: DB,
    path: PathBuf,
}

impl RocksDbStore {
    /// Opens (creating if needed) the database at `path`.
    ///
    /// With `reset` set, an existing directory is removed first. Failure to remove
    /// it is returned to the caller rather than aborting.
    pub fn open(path: impl AsRef<Path>, reset: bool) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if reset && path.exists() {
            std::fs::remove_dir_all(&path)?;
            info!("Removed existing data directory {}", path.display());
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, &path)?;
        Ok(RocksDbStore { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KvStore for RocksDbStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        Ok(self.db.put(key, value)?)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.db.get(key)?)
    }

    fn iter(&self, lower: &[u8], upper: &[u8]) -> KvIter<'_> {
        let mut opts = ReadOptions::default();
        opts.set_iterate_lower_bound(lower.to_vec());
        opts.set_iterate_upper_bound(upper.to_vec());
        Box::new(
            self.db
                .iterator_opt(IteratorMode::Start, opts)
                .map(|item| {
                    item.map(|(k, v)| (k.into_vec(), v.into_vec()))
                        .map_err(StorageError::from)
                }),
        )
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut wb = rocksdb::WriteBatch::default();
        for (key, value) in batch.into_ops() {
            wb.put(key, value);
        }
        Ok(self.db.write(wb)?)
    }
}
