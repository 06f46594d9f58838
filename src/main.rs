//! RFQ relayer node.
//!
//! Starts a single ledger node from command-line arguments or `RFQ_*`
//! environment variables.
//!
//! # Usage
//! ```text
//! rfq-node --listen 127.0.0.1:3000 --id node-a --private-key <hex>
//! rfq-node --listen 127.0.0.1:3001 --id node-b --peer 127.0.0.1:3000
//! ```
//!
//! A node started with a private key is the validator and produces a block
//! every `--block-time-ms`. Without `--data-dir` the chain lives in memory.

use clap::Parser;
use rfq_relayer::config::ServerConfig;
use rfq_relayer::crypto::key_pair::PrivateKey;
use rfq_relayer::network::server::{Server, ServerError};
use rfq_relayer::storage::memory_storage::MemoryStore;
use rfq_relayer::storage::rocksdb_storage::RocksDbStore;
use rfq_relayer::storage::storage_trait::KvStore;
use rfq_relayer::utils::log::{Level, set_max_level};
use rfq_relayer::{error, info};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use zeroize::Zeroizing;

#[derive(Parser, Debug)]
#[command(name = "rfq-node", version, about = "Permissioned RFQ ledger node")]
struct Cli {
    /// Address to listen on for peers
    #[arg(long, env = "RFQ_LISTEN", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Node id carried in every message (defaults to the listen address)
    #[arg(long, env = "RFQ_NODE_ID")]
    id: Option<String>,

    /// Seed peers to dial at startup
    #[arg(long = "peer", env = "RFQ_PEERS", value_delimiter = ',')]
    peers: Vec<SocketAddr>,

    #[arg(long, env = "RFQ_BLOCK_TIME_MS", default_value_t = 5_000)]
    block_time_ms: u64,

    /// Interval between block requests while catching up
    #[arg(long, env = "RFQ_SYNC_RETRY_MS", default_value_t = 6_000)]
    sync_retry_ms: u64,

    #[arg(long, env = "RFQ_MEMPOOL_CAPACITY", default_value_t = 1_000)]
    mempool_capacity: usize,

    /// Drop a peer whose socket accepts no data for this long
    #[arg(long, env = "RFQ_PEER_WRITE_TIMEOUT_MS", default_value_t = 10_000)]
    peer_write_timeout_ms: u64,

    /// Hex validator key; makes this node the validator
    #[arg(long, env = "RFQ_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Generate a fresh validator key instead of reading one
    #[arg(long, conflicts_with = "private_key")]
    generate_key: bool,

    /// RocksDB directory; omit to keep the chain in memory
    #[arg(long, env = "RFQ_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Delete the data directory before opening it
    #[arg(long, env = "RFQ_RESET_DATA_DIR", requires = "data_dir")]
    reset_data_dir: bool,

    #[arg(long, env = "RFQ_LOG_LEVEL", default_value = "info")]
    log_level: Level,
}

impl Cli {
    fn into_config(self) -> Result<ServerConfig, String> {
        let id = self.id.unwrap_or_else(|| self.listen.to_string());
        let mut config = ServerConfig::new(id, self.listen)
            .with_seed_nodes(self.peers)
            .with_block_time(Duration::from_millis(self.block_time_ms))
            .with_sync_retry_interval(Duration::from_millis(self.sync_retry_ms))
            .with_mempool_capacity(self.mempool_capacity)
            .with_peer_write_timeout(Duration::from_millis(self.peer_write_timeout_ms));

        if let Some(hex) = self.private_key {
            let hex = Zeroizing::new(hex);
            let key = PrivateKey::from_hex(&hex).map_err(|e| format!("--private-key: {e}"))?;
            config = config.with_private_key(key);
        } else if self.generate_key {
            let key = PrivateKey::new();
            info!("Generated validator key {}", key.public_key().address());
            config = config.with_private_key(key);
        }

        if let Some(dir) = self.data_dir {
            config = config.with_data_dir(dir, self.reset_data_dir);
        }
        Ok(config)
    }
}

async fn run<S: KvStore>(config: ServerConfig, store: S) -> Result<(), ServerError> {
    let server = Server::bind(config, store).await?;
    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
        }
        shutdown.cancel();
    });
    server.start().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    set_max_level(cli.log_level);

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match config.data_dir.clone() {
        Some(dir) => match RocksDbStore::open(&dir, config.reset_data_dir) {
            Ok(store) => run(config, store).await,
            Err(e) => Err(e.into()),
        },
        None => run(config, MemoryStore::new()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
