//! Live peer connections and the registry that owns them.
//!
//! Every peer has a bounded outbound queue drained by its own [`write_loop`],
//! so sending never waits on a socket. A queue that fills up rejects further
//! frames, and a write that stalls past its deadline drops the peer.

use crate::network::message::Message;
use crate::network::rpc::Rpc;
use crate::network::transport::{TransportError, read_frame, write_frame};
use crate::{debug, warn};
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{Receiver, Sender, channel};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Frames a peer may have queued before sends to it fail.
pub const PEER_QUEUE_LEN: usize = 256;

/// Transport-assigned connection identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Send side of one connection. The socket halves belong to the peer's read
/// and write loops.
pub struct Peer {
    id: PeerId,
    addr: SocketAddr,
    outbound: bool,
    queue: Sender<Bytes>,
    cancel: CancellationToken,
}

impl Peer {
    /// Creates the handle and the receiving end of its outbound queue.
    pub(crate) fn new(
        id: PeerId,
        addr: SocketAddr,
        outbound: bool,
        cancel: CancellationToken,
    ) -> (Self, Receiver<Bytes>) {
        let (queue, outbox) = channel(PEER_QUEUE_LEN);
        let peer = Peer {
            id,
            addr,
            outbound,
            queue,
            cancel,
        };
        (peer, outbox)
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// True when this node dialed the connection.
    pub fn is_outbound(&self) -> bool {
        self.outbound
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn send(&self, msg: &Message) -> Result<(), TransportError> {
        let bytes = msg
            .to_bytes()
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        self.send_bytes_payload(Bytes::from(bytes))
    }

    /// Queues one frame for the write loop. Fails instead of waiting when the
    /// queue is full.
    pub fn send_bytes_payload(&self, payload: Bytes) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }
        match self.queue.try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TransportError::QueueFull(self.id)),
            Err(TrySendError::Closed(_)) => Err(TransportError::Closed),
        }
    }

    /// Stops both loops. The socket closes once both halves are dropped.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// A freshly accepted or dialed connection, handed to the server for registration.
pub struct NewPeer {
    pub peer: Arc<Peer>,
    pub reader: OwnedReadHalf,
    pub writer: OwnedWriteHalf,
    pub outbox: Receiver<Bytes>,
}

/// Read or write failure that ended one of a peer's loops.
#[derive(Debug)]
pub struct PeerError {
    pub peer: PeerId,
    pub addr: SocketAddr,
    pub error: TransportError,
}

/// Frames the peer's byte stream onto `rpc_tx` until the socket fails or
/// `cancel` fires. Failures go to `err_tx`; a cancelled loop reports nothing.
pub async fn read_loop(
    id: PeerId,
    addr: SocketAddr,
    mut reader: OwnedReadHalf,
    rpc_tx: Sender<Rpc>,
    err_tx: Sender<PeerError>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = read_frame(&mut reader) => frame,
        };

        match frame {
            Ok(payload) => {
                let rpc = Rpc {
                    from: id,
                    addr,
                    payload: Bytes::from(payload),
                };
                if rpc_tx.send(rpc).await.is_err() {
                    break;
                }
            }
            Err(error) => {
                let _ = err_tx
                    .send(PeerError {
                        peer: id,
                        addr,
                        error,
                    })
                    .await;
                break;
            }
        }
    }
    debug!("Read loop for {id} ({addr}) stopped");
}

/// Drains `outbox` onto the socket. A write that fails or makes no progress
/// within `write_timeout` is reported on `err_tx` and ends the loop.
pub async fn write_loop<W: AsyncWrite + Unpin>(
    id: PeerId,
    addr: SocketAddr,
    mut writer: W,
    mut outbox: Receiver<Bytes>,
    err_tx: Sender<PeerError>,
    cancel: CancellationToken,
    write_timeout: Duration,
) {
    loop {
        let payload = tokio::select! {
            _ = cancel.cancelled() => break,
            payload = outbox.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };

        let written = tokio::select! {
            _ = cancel.cancelled() => break,
            written = timeout(write_timeout, write_frame(&mut writer, &payload)) => written,
        };
        let error = match written {
            Ok(Ok(())) => continue,
            Ok(Err(error)) => error,
            Err(_) => TransportError::WriteTimeout(write_timeout),
        };
        let _ = err_tx
            .send(PeerError {
                peer: id,
                addr,
                error,
            })
            .await;
        break;
    }
    debug!("Write loop for {id} ({addr}) stopped");
}

/// Connected peers. Mutated only by the server loop; read from broadcast paths.
#[derive(Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<PeerId, Arc<Peer>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PeerId, Arc<Peer>>> {
        self.peers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PeerId, Arc<Peer>>> {
        self.peers.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, peer: Arc<Peer>) {
        self.write().insert(peer.id(), peer);
    }

    /// Drops the peer and cancels its scope.
    pub fn remove(&self, id: PeerId) -> Option<Arc<Peer>> {
        let peer = self.write().remove(&id);
        if let Some(peer) = &peer {
            peer.close();
        }
        peer
    }

    pub fn get(&self, id: PeerId) -> Option<Arc<Peer>> {
        self.read().get(&id).cloned()
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.read().contains_key(&id)
    }

    pub fn snapshot(&self) -> Vec<Arc<Peer>> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn send_to(&self, id: PeerId, msg: &Message) -> Result<(), TransportError> {
        let peer = self.get(id).ok_or(TransportError::PeerNotFound(id))?;
        peer.send(msg)
    }

    /// Queues `payload` for every peer. A peer that cannot take it is logged
    /// and skipped; its own loops report a broken socket.
    pub fn broadcast(&self, payload: Bytes) {
        for peer in self.snapshot() {
            if let Err(e) = peer.send_bytes_payload(payload.clone()) {
                warn!("Broadcast to {} ({}) failed: {e}", peer.id(), peer.addr());
            }
        }
    }

    pub fn close_all(&self) {
        for (_, peer) in self.write().drain() {
            peer.close();
        }
    }
}
