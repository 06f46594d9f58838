//! Named key prefixes that carve one store into logical tables.

use crate::storage::storage_trait::{KvIter, KvStore, StorageError, WriteBatch};

/// A table is a key prefix ending in `/`. Keys are `prefix ++ key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    name: &'static str,
}

impl Table {
    pub const fn new(name: &'static str) -> Self {
        Table { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn key(&self, key: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.name.len() + 1 + key.len());
        out.extend_from_slice(self.name.as_bytes());
        out.push(b'/');
        out.extend_from_slice(key);
        out
    }

    /// Iteration bounds covering exactly this table.
    fn bounds(&self) -> (Vec<u8>, Vec<u8>) {
        let lower = self.key(&[]);
        let mut upper = lower.clone();
        // [name/, name0) holds exactly the keys starting with "name/"
        if let Some(last) = upper.last_mut() {
            *last += 1;
        }
        (lower, upper)
    }

    pub fn put<S: KvStore + ?Sized>(
        &self,
        store: &S,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), StorageError> {
        store.put(&self.key(key), value)
    }

    pub fn get<S: KvStore + ?Sized>(
        &self,
        store: &S,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StorageError> {
        store.get(&self.key(key))
    }

    pub fn batch_put(&self, batch: &mut WriteBatch, key: &[u8], value: Vec<u8>) {
        batch.put(self.key(key), value);
    }

    /// Iterates the table with the prefix stripped from every key.
    pub fn iter<'a, S: KvStore + ?Sized>(&self, store: &'a S) -> KvIter<'a> {
        let (lower, upper) = self.bounds();
        let prefix_len = lower.len();
        Box::new(
            store
                .iter(&lower, &upper)
                .map(move |item| item.map(|(k, v)| (k[prefix_len..].to_vec(), v))),
        )
    }
}
