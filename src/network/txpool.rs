//! Pending transactions awaiting block inclusion.
//!
//! The pool has a single owner, the server loop, so it carries no locks.

use crate::core::transaction::Transaction;
use crate::types::hash::Hash;
use std::collections::HashMap;

/// Default transaction pool capacity.
pub const DEFAULT_TXPOOL_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxPoolError {
    #[error("transaction pool is full ({0} pending)")]
    Full(usize),
}

/// Deduplicated pool that keeps insertion order for block construction.
pub struct TxPool {
    capacity: usize,
    transactions: HashMap<Hash, Transaction>,
    order: Vec<Hash>,
}

impl TxPool {
    /// Creates a pool holding at most `capacity` transactions,
    /// [`DEFAULT_TXPOOL_CAPACITY`] when `None`.
    pub fn new(capacity: Option<usize>) -> Self {
        let capacity = capacity.unwrap_or(DEFAULT_TXPOOL_CAPACITY);
        Self {
            capacity,
            transactions: HashMap::with_capacity(capacity),
            order: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.transactions.contains_key(hash)
    }

    /// Inserts `tx` unless its hash is already pending.
    ///
    /// Returns `Ok(false)` for a duplicate. A full pool refuses new
    /// transactions and evicts nothing.
    pub fn add(&mut self, tx: Transaction) -> Result<bool, TxPoolError> {
        let hash = tx.hash();
        if self.transactions.contains_key(&hash) {
            return Ok(false);
        }
        if self.transactions.len() >= self.capacity {
            return Err(TxPoolError::Full(self.transactions.len()));
        }
        self.order.push(hash);
        self.transactions.insert(hash, tx);
        Ok(true)
    }

    pub fn length(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Snapshot of every pending transaction in insertion order.
    pub fn pending(&self) -> Vec<Transaction> {
        self.order
            .iter()
            .filter_map(|h| self.transactions.get(h).cloned())
            .collect()
    }

    pub fn clear_pending(&mut self) {
        self.transactions.clear();
        self.order.clear();
    }

    /// Drops the given hashes, typically those committed by an imported block.
    pub fn remove_batch(&mut self, hashes: &[Hash]) {
        let mut removed = false;
        for hash in hashes {
            removed |= self.transactions.remove(hash).is_some();
        }
        if removed {
            self.order.retain(|h| self.transactions.contains_key(h));
        }
    }
}
