//! Chain-length gossip and block catch-up.
//!
//! Every node runs a [`status_loop`] that advertises its chain length when it
//! changes. A non-validator that hears about a longer chain starts one
//! [`catch_up_loop`] per advertising peer, which asks for the missing heights
//! on a fixed interval until the local header count reaches the target.

use crate::core::blockchain::Blockchain;
use crate::network::message::{GetBlocksMessage, Message, MessageType, StatusMessage};
use crate::network::peer::{PeerId, PeerRegistry};
use crate::storage::storage_trait::KvStore;
use crate::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tokio_util::sync::CancellationToken;

/// What [`on_status`] decided for an incoming status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// The sender is not ahead of us.
    UpToDate,
    /// Validators never pull blocks.
    NoSync,
    /// A catch-up loop was spawned for the sender.
    Started,
    /// A loop for the sender was already running; its target was raised.
    Raised,
}

/// Target chain length of each running catch-up loop, keyed by peer.
#[derive(Debug, Default)]
pub struct SyncTracker {
    targets: Mutex<HashMap<PeerId, i64>>,
}

impl SyncTracker {
    fn lock(&self) -> MutexGuard<'_, HashMap<PeerId, i64>> {
        self.targets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `target` for `peer`. Returns true when no loop was running yet.
    pub fn register(&self, peer: PeerId, target: i64) -> bool {
        let mut targets = self.lock();
        match targets.get_mut(&peer) {
            Some(current) => {
                *current = (*current).max(target);
                false
            }
            None => {
                targets.insert(peer, target);
                true
            }
        }
    }

    pub fn target(&self, peer: PeerId) -> Option<i64> {
        self.lock().get(&peer).copied()
    }

    /// Ends the loop for `peer` if `have` reached its target.
    pub fn try_finish(&self, peer: PeerId, have: i64) -> bool {
        let mut targets = self.lock();
        match targets.get(&peer) {
            Some(target) if *target > have => false,
            _ => {
                targets.remove(&peer);
                true
            }
        }
    }

    pub fn finish(&self, peer: PeerId) {
        self.lock().remove(&peer);
    }

    pub fn is_active(&self, peer: PeerId) -> bool {
        self.lock().contains_key(&peer)
    }
}

/// Handles shared by the sync loops.
pub struct SyncContext<S: KvStore> {
    pub id: String,
    pub chain: Arc<Blockchain<S>>,
    pub peers: Arc<PeerRegistry>,
    pub tracker: Arc<SyncTracker>,
    pub status_interval: Duration,
    pub retry_interval: Duration,
    pub shutdown: CancellationToken,
}

impl<S: KvStore> Clone for SyncContext<S> {
    fn clone(&self) -> Self {
        SyncContext {
            id: self.id.clone(),
            chain: self.chain.clone(),
            peers: self.peers.clone(),
            tracker: self.tracker.clone(),
            status_interval: self.status_interval,
            retry_interval: self.retry_interval,
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Reacts to a peer's advertised chain length.
pub fn on_status<S: KvStore>(
    ctx: &SyncContext<S>,
    from: PeerId,
    status: &StatusMessage,
    is_validator: bool,
) -> SyncAction {
    let have = ctx.chain.header_count() as i64;
    if status.current_length <= have {
        return SyncAction::UpToDate;
    }
    if is_validator {
        return SyncAction::NoSync;
    }

    if ctx.tracker.register(from, status.current_length) {
        info!(
            "{} ({}) is ahead: length {} > {have}, starting catch-up",
            status.id, from, status.current_length
        );
        tokio::spawn(catch_up_loop(ctx.clone(), from));
        SyncAction::Started
    } else {
        debug!(
            "Catch-up with {from} already running, target now {}",
            status.current_length
        );
        SyncAction::Raised
    }
}

/// Broadcasts our chain length every `status_interval`, skipping ticks where
/// the height did not move.
pub async fn status_loop<S: KvStore>(ctx: SyncContext<S>) {
    let mut ticker = interval_at(Instant::now() + ctx.status_interval, ctx.status_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_height = None;

    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let height = ctx.chain.height();
        if last_height == Some(height) {
            continue;
        }
        let status = StatusMessage {
            current_length: height + 1,
            id: ctx.id.clone(),
        };
        match Message::frame(MessageType::Status, ctx.id.clone(), &status) {
            Ok(frame) => ctx.peers.broadcast(frame),
            Err(e) => warn!("Failed to encode status: {e}"),
        }
        last_height = Some(height);
    }
    debug!("Status loop stopped");
}

/// Requests missing blocks from `peer` every `retry_interval` until the local
/// header count reaches the tracked target. Blocks arrive through the server
/// loop; this task only issues requests.
pub async fn catch_up_loop<S: KvStore>(ctx: SyncContext<S>, peer: PeerId) {
    let mut ticker = interval(ctx.retry_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => {
                ctx.tracker.finish(peer);
                break;
            }
            _ = ticker.tick() => {}
        }

        let have = ctx.chain.header_count() as i64;
        if ctx.tracker.try_finish(peer, have) {
            info!("Caught up with {peer} at length {have}");
            break;
        }
        let Some(target) = ctx.tracker.target(peer) else {
            break;
        };

        let request = GetBlocksMessage::catch_up(target as u64, have as u64);
        let sent = match Message::encode(MessageType::GetBlocks, ctx.id.clone(), &request) {
            Ok(msg) => ctx.peers.send_to(peer, &msg),
            Err(e) => {
                warn!("Failed to encode block request: {e}");
                break;
            }
        };
        match sent {
            Ok(()) => debug!("Requested heights {}..={} from {peer}", request.to, request.from),
            Err(e) => {
                warn!("Catch-up with {peer} aborted: {e}");
                ctx.tracker.finish(peer);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_pair::PrivateKey;
    use crate::network::transport::read_frame;
    use crate::storage::memory_storage::MemoryStore;
    use crate::utils::test_utils::utils::{chain_with_genesis, connected_peer, extend_chain};
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    fn context(chain: Arc<Blockchain<MemoryStore>>, peers: Arc<PeerRegistry>) -> SyncContext<MemoryStore> {
        SyncContext {
            id: "node-b".into(),
            chain,
            peers,
            tracker: Arc::new(SyncTracker::default()),
            status_interval: Duration::from_millis(30),
            retry_interval: Duration::from_millis(20),
            shutdown: CancellationToken::new(),
        }
    }

    async fn next_message(remote: &mut TcpStream, wait: Duration) -> Option<Message> {
        let frame = timeout(wait, read_frame(remote)).await.ok()?.unwrap();
        Some(borsh::from_slice(&frame).unwrap())
    }

    #[test]
    fn tracker_raises_target_instead_of_duplicating() {
        let tracker = SyncTracker::default();
        assert!(tracker.register(PeerId(1), 10));
        assert!(!tracker.register(PeerId(1), 15));
        assert!(!tracker.register(PeerId(1), 12));
        assert_eq!(tracker.target(PeerId(1)), Some(15));

        assert!(!tracker.try_finish(PeerId(1), 14));
        assert!(tracker.try_finish(PeerId(1), 15));
        assert!(!tracker.is_active(PeerId(1)));
    }

    #[tokio::test]
    async fn status_decisions() {
        let key = PrivateKey::new();
        let chain = Arc::new(chain_with_genesis(&key));
        extend_chain(&chain, &key, 2);
        let ctx = context(chain, Arc::new(PeerRegistry::new()));
        ctx.shutdown.cancel();

        let behind = StatusMessage {
            current_length: 3,
            id: "a".into(),
        };
        assert_eq!(on_status(&ctx, PeerId(1), &behind, false), SyncAction::UpToDate);

        let ahead = StatusMessage {
            current_length: 10,
            id: "a".into(),
        };
        assert_eq!(on_status(&ctx, PeerId(1), &ahead, true), SyncAction::NoSync);
        assert!(!ctx.tracker.is_active(PeerId(1)));
    }

    #[tokio::test]
    async fn catch_up_requests_until_target_reached() {
        let key = PrivateKey::new();
        let source = chain_with_genesis(&key);
        extend_chain(&source, &key, 9);
        let chain = Arc::new(chain_with_genesis(&key));
        extend_chain(&chain, &key, 2);
        assert_eq!(chain.header_count(), 3);

        let peers = Arc::new(PeerRegistry::new());
        let mut remote = connected_peer(&peers, 1).await;
        let ctx = context(chain.clone(), peers);

        let status = StatusMessage {
            current_length: 10,
            id: "node-a".into(),
        };
        assert_eq!(on_status(&ctx, PeerId(1), &status, false), SyncAction::Started);
        assert_eq!(on_status(&ctx, PeerId(1), &status, false), SyncAction::Raised);

        let mut requests = 0;
        while chain.header_count() < 10 {
            let msg = next_message(&mut remote, Duration::from_secs(2))
                .await
                .expect("catch-up stalled");
            assert_eq!(msg.header, MessageType::GetBlocks as u8);
            let req: GetBlocksMessage = borsh::from_slice(&msg.data).unwrap();
            assert_eq!(req.from, 9);
            requests += 1;
            // Serve one block per request, ignoring retries that crossed an import
            if req.to == chain.header_count() as u64 {
                chain.verify_block(source.get_block(req.to).unwrap()).unwrap();
            }
        }
        assert!(requests >= 7);

        while ctx.tracker.is_active(PeerId(1)) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        while let Some(msg) = next_message(&mut remote, Duration::from_millis(150)).await {
            let req: GetBlocksMessage = borsh::from_slice(&msg.data).unwrap();
            assert!(req.to < 10, "request issued after catching up");
        }
    }

    #[tokio::test]
    async fn catch_up_ends_when_peer_is_gone() {
        let key = PrivateKey::new();
        let ctx = context(
            Arc::new(chain_with_genesis(&key)),
            Arc::new(PeerRegistry::new()),
        );
        ctx.tracker.register(PeerId(5), 10);
        timeout(Duration::from_secs(1), catch_up_loop(ctx.clone(), PeerId(5)))
            .await
            .unwrap();
        assert!(!ctx.tracker.is_active(PeerId(5)));
    }

    #[tokio::test]
    async fn status_is_sent_only_when_height_changes() {
        let key = PrivateKey::new();
        let chain = Arc::new(chain_with_genesis(&key));
        let peers = Arc::new(PeerRegistry::new());
        let mut remote = connected_peer(&peers, 1).await;
        let ctx = context(chain.clone(), peers);
        tokio::spawn(status_loop(ctx.clone()));

        let msg = next_message(&mut remote, Duration::from_secs(1)).await.unwrap();
        assert_eq!(msg.header, MessageType::Status as u8);
        let status: StatusMessage = borsh::from_slice(&msg.data).unwrap();
        assert_eq!(status.current_length, 1);
        assert_eq!(status.id, "node-b");

        assert!(next_message(&mut remote, Duration::from_millis(120)).await.is_none());

        extend_chain(&chain, &key, 1);
        let msg = next_message(&mut remote, Duration::from_secs(1)).await.unwrap();
        let status: StatusMessage = borsh::from_slice(&msg.data).unwrap();
        assert_eq!(status.current_length, 2);

        ctx.shutdown.cancel();
    }
}
