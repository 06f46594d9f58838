//! Node configuration.

use crate::crypto::key_pair::PrivateKey;
use crate::network::txpool::DEFAULT_TXPOOL_CAPACITY;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BLOCK_TIME: Duration = Duration::from_secs(5);
pub const DEFAULT_SYNC_RETRY_INTERVAL: Duration = Duration::from_secs(6);
pub const DEFAULT_PEER_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("node id must not be empty")]
    EmptyId,
    #[error("block time must be greater than zero")]
    ZeroBlockTime,
    #[error("sync retry interval must be greater than zero")]
    ZeroSyncInterval,
    #[error("mempool capacity must be greater than zero")]
    ZeroMempoolCapacity,
    #[error("peer write timeout must be greater than zero")]
    ZeroWriteTimeout,
}

/// Everything a [`Server`](crate::network::server::Server) needs to start.
#[derive(Clone)]
pub struct ServerConfig {
    /// Node id carried in every outgoing envelope
    pub id: String,
    pub listen_addr: SocketAddr,
    /// Peers dialed at startup
    pub seed_nodes: Vec<SocketAddr>,
    /// Validator tick, also the status broadcast interval
    pub block_time: Duration,
    pub sync_retry_interval: Duration,
    pub mempool_capacity: usize,
    /// A peer whose socket takes no data for this long is dropped
    pub peer_write_timeout: Duration,
    /// If set, this node becomes the validator
    pub private_key: Option<PrivateKey>,
    /// RocksDB directory; `None` keeps the chain in memory
    pub data_dir: Option<PathBuf>,
    /// Wipe `data_dir` before opening it
    pub reset_data_dir: bool,
}

impl ServerConfig {
    pub fn new(id: impl Into<String>, listen_addr: SocketAddr) -> Self {
        ServerConfig {
            id: id.into(),
            listen_addr,
            seed_nodes: Vec::new(),
            block_time: DEFAULT_BLOCK_TIME,
            sync_retry_interval: DEFAULT_SYNC_RETRY_INTERVAL,
            mempool_capacity: DEFAULT_TXPOOL_CAPACITY,
            peer_write_timeout: DEFAULT_PEER_WRITE_TIMEOUT,
            private_key: None,
            data_dir: None,
            reset_data_dir: false,
        }
    }

    pub fn with_seed_nodes(mut self, seeds: Vec<SocketAddr>) -> Self {
        self.seed_nodes = seeds;
        self
    }

    pub fn with_block_time(mut self, block_time: Duration) -> Self {
        self.block_time = block_time;
        self
    }

    pub fn with_sync_retry_interval(mut self, interval: Duration) -> Self {
        self.sync_retry_interval = interval;
        self
    }

    pub fn with_mempool_capacity(mut self, capacity: usize) -> Self {
        self.mempool_capacity = capacity;
        self
    }

    pub fn with_peer_write_timeout(mut self, timeout: Duration) -> Self {
        self.peer_write_timeout = timeout;
        self
    }

    pub fn with_private_key(mut self, key: PrivateKey) -> Self {
        self.private_key = Some(key);
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>, reset: bool) -> Self {
        self.data_dir = Some(dir.into());
        self.reset_data_dir = reset;
        self
    }

    pub fn is_validator(&self) -> bool {
        self.private_key.is_some()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::EmptyId);
        }
        if self.block_time.is_zero() {
            return Err(ConfigError::ZeroBlockTime);
        }
        if self.sync_retry_interval.is_zero() {
            return Err(ConfigError::ZeroSyncInterval);
        }
        if self.mempool_capacity == 0 {
            return Err(ConfigError::ZeroMempoolCapacity);
        }
        if self.peer_write_timeout.is_zero() {
            return Err(ConfigError::ZeroWriteTimeout);
        }
        Ok(())
    }
}
