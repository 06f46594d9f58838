//! In-memory [`KvStore`] for tests and nodes started without a data directory.

use crate::storage::storage_trait::{KvIter, KvStore, StorageError, WriteBatch};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.write_lock().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.read().get(key).cloned())
    }

    fn iter(&self, lower: &[u8], upper: &[u8]) -> KvIter<'_> {
        if lower >= upper {
            return Box::new(std::iter::empty());
        }
        // Snapshot the range so the lock is not held while the caller iterates.
        let items: Vec<_> = self
            .read()
            .range(lower.to_vec()..upper.to_vec())
            .map(|(k, v)| Ok((k.clone(), v.clone())))
            .collect();
        Box::new(items.into_iter())
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut map = self.write_lock();
        for (key, value) in batch.into_ops() {
            map.insert(key, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get() {
        let store = MemoryStore::new();
        store.put(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.get(b"missing").unwrap(), None);
        assert!(store.contains(b"k").unwrap());
    }

    #[test]
    fn iter_respects_bounds() {
        let store = MemoryStore::new();
        for key in [b"a1", b"a2", b"b1"] {
            store.put(key, b"x").unwrap();
        }
        let keys: Vec<_> = store
            .iter(b"a", b"b")
            .map(|item| item.unwrap().0)
            .collect();
        assert_eq!(keys, vec![b"a1".to_vec(), b"a2".to_vec()]);
        assert_eq!(store.iter(b"b", b"a").count(), 0);
    }

    #[test]
    fn batch_applies_all_writes() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put(b"x".to_vec(), b"1".to_vec());
        batch.put(b"y".to_vec(), b"2".to_vec());
        assert_eq!(batch.len(), 2);
        store.write(batch).unwrap();
        assert_eq!(store.len(), 2);
    }
}
