//! Node server: one central loop that owns the mempool and peer membership.
//!
//! Peer read loops, the external transaction feed and the validator ticker all
//! funnel into [`Server::start`]'s select loop, which is the only place the
//! mempool and the peer registry are mutated. The ledger serializes its own
//! writes, so background sync tasks may read it freely. Handlers never wait
//! on a socket: outgoing frames are queued on each peer's write loop.

use crate::config::{ConfigError, ServerConfig};
use crate::core::block::Block;
use crate::core::blockchain::{Blockchain, LedgerError};
use crate::core::lifecycle::RfqLifecycle;
use crate::core::transaction::{Transaction, TxError};
use crate::core::validator::BlockValidator;
use crate::crypto::key_pair::CryptoError;
use crate::network::message::{
    BlocksMessage, GetBlocksMessage, Message, MessageType, StatusMessage,
};
use crate::network::peer::{NewPeer, PeerError, PeerId, PeerRegistry, read_loop, write_loop};
use crate::network::rpc::{DecodedMessage, DecodedMessageData, HandleRpcFn, Rpc, RpcError, decode_rpc};
use crate::network::sync::{self, SyncContext, SyncTracker};
use crate::network::transport::{TcpTransport, TransportError};
use crate::network::txpool::{TxPool, TxPoolError};
use crate::storage::storage_trait::{KvStore, StorageError};
use crate::types::hash::Hash;
use crate::utils::time::{unix_millis, unix_nanos};
use crate::{debug, error, info, warn};
use borsh::BorshSerialize;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc::{
    Receiver, Sender, UnboundedReceiver, UnboundedSender, channel, unbounded_channel,
};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

const PEER_CHANNEL_SIZE: usize = 64;
const RPC_CHANNEL_SIZE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    TxPool(#[from] TxPoolError),
    #[error(transparent)]
    Transaction(#[from] TxError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("failed to encode message: {0}")]
    Encode(#[source] io::Error),
    #[error("node has no validator key")]
    NotValidator,
}

pub struct Server<S: KvStore> {
    config: ServerConfig,
    chain: Arc<Blockchain<S>>,
    peers: Arc<PeerRegistry>,
    transport: Arc<TcpTransport>,
    mempool: TxPool,
    lifecycle: RfqLifecycle,
    tracker: Arc<SyncTracker>,
    rpc_decode: HandleRpcFn,
    shutdown: CancellationToken,
    peer_rx: Receiver<NewPeer>,
    rpc_tx: Sender<Rpc>,
    rpc_rx: Receiver<Rpc>,
    err_tx: Sender<PeerError>,
    err_rx: Receiver<PeerError>,
    tx_tx: UnboundedSender<Transaction>,
    tx_rx: UnboundedReceiver<Transaction>,
}

impl<S: KvStore> Server<S> {
    /// Opens the ledger over `store` and binds the listener.
    ///
    /// A validator whose chain is empty creates and commits the genesis block.
    pub async fn bind(config: ServerConfig, store: S) -> Result<Self, ServerError> {
        config.validate()?;
        let chain = Arc::new(Blockchain::new(store, BlockValidator)?);

        let mut lifecycle = RfqLifecycle::new();
        if let Some(key) = &config.private_key {
            let me = key.public_key().address();
            match chain.authority() {
                None => {
                    chain.verify_block(Block::genesis(key, unix_nanos())?)?;
                    info!("Created genesis block, validator {me}");
                }
                Some(authority) if authority != me => warn!(
                    "Validator key {me} is not the chain authority {authority}, its blocks will be rejected"
                ),
                Some(_) => {
                    lifecycle = RfqLifecycle::restore(&chain, unix_millis(), key)?;
                    if lifecycle.tracked_count() > 0 {
                        info!("Resumed {} unclosed RFQs", lifecycle.tracked_count());
                    }
                }
            }
        }

        let shutdown = CancellationToken::new();
        let (peer_tx, peer_rx) = channel(PEER_CHANNEL_SIZE);
        let transport = TcpTransport::bind(config.listen_addr, peer_tx, shutdown.clone()).await?;
        let (rpc_tx, rpc_rx) = channel(RPC_CHANNEL_SIZE);
        let (err_tx, err_rx) = channel(PEER_CHANNEL_SIZE);
        let (tx_tx, tx_rx) = unbounded_channel();

        Ok(Server {
            mempool: TxPool::new(Some(config.mempool_capacity)),
            config,
            chain,
            peers: Arc::new(PeerRegistry::new()),
            transport,
            lifecycle,
            tracker: Arc::new(SyncTracker::default()),
            rpc_decode: decode_rpc,
            shutdown,
            peer_rx,
            rpc_tx,
            rpc_rx,
            err_tx,
            err_rx,
            tx_tx,
            tx_rx,
        })
    }

    /// Replaces the frame decoder.
    pub fn with_rpc_handler(mut self, handler: HandleRpcFn) -> Self {
        self.rpc_decode = handler;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn chain(&self) -> &Arc<Blockchain<S>> {
        &self.chain
    }

    pub fn peers(&self) -> &Arc<PeerRegistry> {
        &self.peers
    }

    pub fn mempool(&self) -> &TxPool {
        &self.mempool
    }

    pub fn is_validator(&self) -> bool {
        self.config.private_key.is_some()
    }

    pub fn lifecycle(&self) -> &RfqLifecycle {
        &self.lifecycle
    }

    /// Intake for transactions built outside the node, e.g. by a submission API.
    pub fn tx_sender(&self) -> UnboundedSender<Transaction> {
        self.tx_tx.clone()
    }

    /// Root cancellation scope. Cancelling it stops the server and every peer.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn sync_context(&self) -> SyncContext<S> {
        SyncContext {
            id: self.config.id.clone(),
            chain: self.chain.clone(),
            peers: self.peers.clone(),
            tracker: self.tracker.clone(),
            status_interval: self.config.block_time,
            retry_interval: self.config.sync_retry_interval,
            shutdown: self.shutdown.clone(),
        }
    }

    /// Runs until the shutdown token is cancelled.
    pub async fn start(mut self) -> Result<(), ServerError> {
        self.transport.start()?;
        info!(
            "Node {} listening on {} (validator={}, height={})",
            self.config.id,
            self.local_addr(),
            self.is_validator(),
            self.chain.height()
        );

        for seed in self.config.seed_nodes.clone() {
            let transport = self.transport.clone();
            tokio::spawn(async move {
                if let Err(e) = transport.dial(seed).await {
                    warn!("{e}");
                }
            });
        }
        tokio::spawn(sync::status_loop(self.sync_context()));

        let is_validator = self.is_validator();
        let block_time = self.config.block_time;
        let mut ticker = interval_at(Instant::now() + block_time, block_time);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(new_peer) = self.peer_rx.recv() => self.add_peer(new_peer),
                Some(tx) = self.tx_rx.recv() => {
                    if let Err(e) = self.process_transaction(tx) {
                        log_error(&e);
                    }
                }
                Some(rpc) = self.rpc_rx.recv() => self.handle_rpc(rpc),
                Some(err) = self.err_rx.recv() => self.remove_peer(err),
                _ = ticker.tick(), if is_validator => {
                    if let Err(e) = self.create_new_block() {
                        error!("Failed to create block: {e}");
                    }
                }
            }
        }

        self.peers.close_all();
        info!("Server {} shut down", self.config.id);
        Ok(())
    }

    fn add_peer(&mut self, new_peer: NewPeer) {
        let NewPeer {
            peer,
            reader,
            writer,
            outbox,
        } = new_peer;
        let (id, addr) = (peer.id(), peer.addr());
        self.peers.insert(peer.clone());
        tokio::spawn(read_loop(
            id,
            addr,
            reader,
            self.rpc_tx.clone(),
            self.err_tx.clone(),
            peer.cancel_token().clone(),
        ));
        tokio::spawn(write_loop(
            id,
            addr,
            writer,
            outbox,
            self.err_tx.clone(),
            peer.cancel_token().clone(),
            self.config.peer_write_timeout,
        ));
        info!(
            "New {} peer {id} at {addr}",
            if peer.is_outbound() { "outbound" } else { "inbound" }
        );

        let msg = Message::new(MessageType::GetStatus, self.config.id.clone(), Vec::new());
        if let Err(e) = peer.send(&msg) {
            warn!("Failed to request status from {id}: {e}");
        }
    }

    fn remove_peer(&mut self, err: PeerError) {
        self.tracker.finish(err.peer);
        if self.peers.remove(err.peer).is_none() {
            return;
        }
        if err.error.is_closed() {
            info!("Peer {} ({}) disconnected", err.peer, err.addr);
        } else {
            warn!("Dropped peer {} ({}): {}", err.peer, err.addr, err.error);
        }
    }

    fn handle_rpc(&mut self, rpc: Rpc) {
        let result = match (self.rpc_decode)(rpc) {
            Ok(msg) => self.process_message(msg),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            log_error(&e);
        }
    }

    /// Dispatches one decoded message to its handler.
    pub fn process_message(&mut self, msg: DecodedMessage) -> Result<(), ServerError> {
        match msg.data {
            DecodedMessageData::Tx(tx) => self.process_transaction(tx).map(|_| ()),
            DecodedMessageData::Block(block) => self.process_block(block),
            DecodedMessageData::GetStatus => self.process_get_status(msg.from),
            DecodedMessageData::Status(status) => {
                self.process_status(msg.from, &status);
                Ok(())
            }
            DecodedMessageData::GetBlocks(request) => {
                self.process_get_blocks(msg.from, request)
            }
            DecodedMessageData::Blocks(blocks) => self.process_blocks(blocks),
            DecodedMessageData::Unknown(tag) => {
                warn!(
                    "Ignoring message with unknown type {tag} from {} ({})",
                    msg.sender_id, msg.addr
                );
                Ok(())
            }
        }
    }

    /// Admits `tx` to the mempool and floods it to every peer.
    ///
    /// Returns `Ok(false)` for a transaction already pending or committed,
    /// which is neither stored nor re-broadcast.
    pub fn process_transaction(&mut self, tx: Transaction) -> Result<bool, ServerError> {
        let hash = tx.hash();
        if self.mempool.contains(&hash) || self.chain.has_transaction(&hash)? {
            debug!("Transaction {} already seen", hash.short());
            return Ok(false);
        }
        self.chain.validate_transaction(&tx)?;

        let frame = Message::frame(MessageType::Tx, self.config.id.clone(), &tx)
            .map_err(ServerError::Encode)?;
        self.mempool.add(tx)?;
        info!(
            "Added transaction {} to the mempool (pending={})",
            hash.short(),
            self.mempool.length()
        );
        self.peers.broadcast(frame);
        Ok(true)
    }

    /// Imports a gossiped block and relays it. Invalid blocks are never relayed.
    pub fn process_block(&mut self, block: Block) -> Result<(), ServerError> {
        let committed = tx_hashes(&block.transactions);
        self.chain.verify_block(block.clone())?;
        self.mempool.remove_batch(&committed);
        self.broadcast(MessageType::Block, &block)
    }

    fn process_get_status(&self, from: PeerId) -> Result<(), ServerError> {
        let status = StatusMessage {
            current_length: self.chain.header_count() as i64,
            id: self.config.id.clone(),
        };
        let msg = Message::encode(MessageType::Status, self.config.id.clone(), &status)
            .map_err(ServerError::Encode)?;
        self.peers.send_to(from, &msg)?;
        Ok(())
    }

    fn process_status(&self, from: PeerId, status: &StatusMessage) {
        let action = sync::on_status(&self.sync_context(), from, status, self.is_validator());
        debug!(
            "Status from {} ({from}): length {}, {action:?}",
            status.id, status.current_length
        );
    }

    /// Replies with the requested heights this node holds, lowest first.
    fn process_get_blocks(
        &self,
        from: PeerId,
        request: GetBlocksMessage,
    ) -> Result<(), ServerError> {
        let Some(range) = request.serve_range(self.chain.height()) else {
            debug!(
                "Nothing to serve {from} for {}..={}",
                request.to, request.from
            );
            return Ok(());
        };

        let mut blocks = Vec::new();
        for height in range {
            blocks.push(self.chain.get_block(height)?.into_full());
        }
        debug!("Serving {} blocks to {from}", blocks.len());
        let msg = Message::encode(
            MessageType::Blocks,
            self.config.id.clone(),
            &BlocksMessage { blocks },
        )
        .map_err(ServerError::Encode)?;
        self.peers.send_to(from, &msg)?;
        Ok(())
    }

    /// Imports a batch of synced blocks in order, stopping at the first rejection.
    fn process_blocks(&mut self, msg: BlocksMessage) -> Result<(), ServerError> {
        for full in msg.blocks {
            let committed = full
                .body
                .as_ref()
                .map(|body| tx_hashes(&body.transactions))
                .unwrap_or_default();
            match self.chain.verify_full_block(full) {
                Ok(()) => self.mempool.remove_batch(&committed),
                Err(e) if e.is_known() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// One validator tick: build a block from the lifecycle's stage
    /// transactions followed by the pending snapshot, commit it, clear the
    /// mempool and gossip the block.
    ///
    /// Stage transactions (opens for committed requests, closes for passed
    /// deadlines) bypass the mempool and are retried until a block carries them.
    pub fn create_new_block(&mut self) -> Result<(), ServerError> {
        let key = self
            .config
            .private_key
            .clone()
            .ok_or(ServerError::NotValidator)?;

        let mut transactions = self.lifecycle.stage_transactions(unix_millis(), &key)?;
        transactions.extend(self.mempool.pending());
        let block = self.chain.build_block(&key, transactions, unix_nanos())?;
        self.chain.verify_block(block.clone())?;
        self.mempool.clear_pending();
        self.lifecycle.on_block_committed(&block, unix_millis(), &key)?;
        self.broadcast(MessageType::Block, &block)
    }

    fn broadcast<T: BorshSerialize>(&self, kind: MessageType, body: &T) -> Result<(), ServerError> {
        let frame =
            Message::frame(kind, self.config.id.clone(), body).map_err(ServerError::Encode)?;
        self.peers.broadcast(frame);
        Ok(())
    }
}

fn tx_hashes(transactions: &[Transaction]) -> Vec<Hash> {
    transactions.iter().map(Transaction::hash).collect()
}

/// "Already known" is routine under gossip and only logged at debug.
fn log_error(e: &ServerError) {
    match e {
        ServerError::Ledger(inner) if inner.is_known() => debug!("{inner}"),
        _ => warn!("{e}"),
    }
}
