//! Key-value storage backends and the table layer on top of them.
//!
//! - [`storage_trait`]: the [`KvStore`](storage_trait::KvStore) contract
//! - [`table`]: named key prefixes
//! - [`memory_storage`]: in-memory backend
//! - [`rocksdb_storage`]: persistent RocksDB backend

pub mod memory_storage;
pub mod rocksdb_storage;
pub mod storage_trait;
pub mod table;
