//! TCP transport with length-prefixed framing.
//!
//! # Framing
//!
//! Every message is a little-endian `u32` length followed by that many bytes.
//! Zero-length frames and frames above [`MAX_FRAME_LEN`] are rejected.
//!
//! # Connection model
//!
//! One TCP connection per peer pair, used in both directions. Every accepted
//! or dialed stream is split and handed to the server on the peer channel as a
//! [`NewPeer`]; the server registers it and starts its read and write loops.

use crate::network::peer::{NewPeer, Peer, PeerId};
use crate::{debug, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

/// Largest accepted frame.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("peer not found: {0}")]
    PeerNotFound(PeerId),

    #[error("connection closed by remote")]
    Closed,

    #[error("outbound queue for {0} is full")]
    QueueFull(PeerId),

    #[error("write stalled for {0:?}")]
    WriteTimeout(Duration),

    #[error("invalid frame length {0}")]
    InvalidFrameLength(usize),

    #[error("failed to dial {addr}: {source}")]
    Dial {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("transport already started")]
    AlreadyStarted,

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Remote hung up, as opposed to a protocol or I/O fault.
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

/// Reads one frame. A clean EOF before the length prefix is [`TransportError::Closed`].
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, TransportError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(TransportError::Closed),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(TransportError::InvalidFrameLength(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Writes one frame and flushes.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), TransportError> {
    if payload.is_empty() || payload.len() > MAX_FRAME_LEN {
        return Err(TransportError::InvalidFrameLength(payload.len()));
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub struct TcpTransport {
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    peer_tx: Sender<NewPeer>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl TcpTransport {
    /// Binds the listener. Accepting starts with [`TcpTransport::start`].
    pub async fn bind(
        addr: SocketAddr,
        peer_tx: Sender<NewPeer>,
        shutdown: CancellationToken,
    ) -> Result<Arc<Self>, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Arc::new(TcpTransport {
            local_addr,
            listener: Mutex::new(Some(listener)),
            peer_tx,
            next_id: AtomicU64::new(1),
            shutdown,
        }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the accept loop. Can only be called once.
    pub fn start(self: &Arc<Self>) -> Result<(), TransportError> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::AlreadyStarted)?;
        tokio::spawn(self.clone().accept_loop(listener));
        Ok(())
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if !self.deliver(stream, addr, false).await {
                            break;
                        }
                    }
                    Err(e) => warn!("Accept on {} failed: {e}", self.local_addr),
                },
            }
        }
        debug!("Accept loop on {} stopped", self.local_addr);
    }

    /// Connects to `addr` and hands the connection to the server.
    pub async fn dial(&self, addr: SocketAddr) -> Result<(), TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| TransportError::Dial { addr, source })?;
        info!("Connected to {addr}");
        if !self.deliver(stream, addr, true).await {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    /// Returns false once the server stopped taking peers.
    async fn deliver(&self, stream: TcpStream, addr: SocketAddr, outbound: bool) -> bool {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay on {addr}: {e}");
        }
        let (reader, writer) = stream.into_split();
        let id = PeerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (peer, outbox) = Peer::new(id, addr, outbound, self.shutdown.child_token());
        self.peer_tx
            .send(NewPeer {
                peer: Arc::new(peer),
                reader,
                writer,
                outbox,
            })
            .await
            .is_ok()
    }
}
