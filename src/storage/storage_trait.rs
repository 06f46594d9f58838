//! Byte-level key-value storage contract used by the ledger.

use std::io;

/// Errors that can occur while interacting with storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("storage lock poisoned")]
    Poisoned,
}

/// Lazily evaluated `(key, value)` pairs in ascending key order.
pub type KvIter<'a> = Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>), StorageError>> + 'a>;

/// Group of writes applied atomically by [`KvStore::write`].
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    ops: Vec<(Vec<u8>, Vec<u8>)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push((key.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.ops
    }
}

/// Storage backend. Implementations must be thread-safe.
pub trait KvStore: Send + Sync + 'static {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// `Ok(None)` when the key is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Iterates keys in `[lower, upper)`.
    fn iter(&self, lower: &[u8], upper: &[u8]) -> KvIter<'_>;

    /// Applies every write in `batch` or none of them.
    fn write(&self, batch: WriteBatch) -> Result<(), StorageError>;

    fn contains(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }
}
