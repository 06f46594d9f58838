//! Validator-side driver that moves requests through the open and closed stages.
//!
//! Stage transactions are signed by the validator and go straight into the
//! next block it builds, so a full mempool never holds them back. An RFQ stays
//! tracked until the block carrying its closed transaction is committed.

use crate::core::block::Block;
use crate::core::blockchain::{Blockchain, LedgerError};
use crate::core::rfq::{ClosedRfq, OpenRfq};
use crate::core::transaction::{Transaction, TxError, TxType};
use crate::crypto::key_pair::PrivateKey;
use crate::storage::storage_trait::KvStore;
use crate::types::hash::Hash;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Stage {
    /// Request committed, its open transaction waits for a block.
    Opening(Transaction),
    Open { closes_at_ms: u64 },
    /// Deadline passed, its closed transaction waits for a block.
    Closing(Transaction),
}

/// Unclosed RFQs keyed by request hash.
#[derive(Debug, Default)]
pub struct RfqLifecycle {
    rfqs: BTreeMap<Hash, Stage>,
}

impl RfqLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the tracked set from the ledger tables.
    ///
    /// Requests without an open record get a fresh open transaction dated `now_ms`.
    pub fn restore<S: KvStore>(
        chain: &Blockchain<S>,
        now_ms: u64,
        key: &PrivateKey,
    ) -> Result<Self, LedgerError> {
        let mut lifecycle = Self::new();
        for rfq in chain.get_unclosed_rfqs()? {
            let stage = match rfq.opened {
                Some(open) => Stage::Open {
                    closes_at_ms: open.closes_at_ms,
                },
                None => Stage::Opening(open_tx(rfq.request, rfq.rfq_duration_ms, now_ms, key)?),
            };
            lifecycle.rfqs.insert(rfq.request, stage);
        }
        Ok(lifecycle)
    }

    /// Number of RFQs not yet closed on chain.
    pub fn tracked_count(&self) -> usize {
        self.rfqs.len()
    }

    pub fn is_tracked(&self, request: &Hash) -> bool {
        self.rfqs.contains_key(request)
    }

    /// True once the open transaction for `request` is committed and its
    /// closed transaction is not.
    pub fn is_open(&self, request: &Hash) -> bool {
        matches!(
            self.rfqs.get(request),
            Some(Stage::Open { .. } | Stage::Closing(_))
        )
    }

    /// Advances tracked RFQs past the stage transactions committed in `block`
    /// and queues an open transaction for every new request.
    pub fn on_block_committed(
        &mut self,
        block: &Block,
        now_ms: u64,
        key: &PrivateKey,
    ) -> Result<(), TxError> {
        for tx in &block.transactions {
            match tx.kind()? {
                TxType::Request => {
                    let request = tx.hash();
                    if self.rfqs.contains_key(&request) {
                        continue;
                    }
                    let data = tx.signable_data()?;
                    let open = open_tx(request, data.rfq_duration_ms, now_ms, key)?;
                    self.rfqs.insert(request, Stage::Opening(open));
                }
                TxType::Open => {
                    let Some(request) = tx.reference_tx_hash else {
                        continue;
                    };
                    if self.is_open(&request) {
                        continue;
                    }
                    let body: OpenRfq = tx.decode_payload()?;
                    self.rfqs.insert(
                        request,
                        Stage::Open {
                            closes_at_ms: body.closes_at_ms,
                        },
                    );
                }
                TxType::Closed => {
                    if let Some(request) = &tx.reference_tx_hash {
                        self.rfqs.remove(request);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Stage transactions for the next block: queued opens plus a closed
    /// transaction for every open RFQ whose deadline is at or before `now_ms`.
    ///
    /// Returned transactions stay queued until a committed block carries them.
    pub fn stage_transactions(
        &mut self,
        now_ms: u64,
        key: &PrivateKey,
    ) -> Result<Vec<Transaction>, TxError> {
        for (request, stage) in self.rfqs.iter_mut() {
            if let Stage::Open { closes_at_ms } = stage
                && *closes_at_ms <= now_ms
            {
                let body = ClosedRfq {
                    closed_at_ms: now_ms,
                };
                let closed = Transaction::stage(TxType::Closed, *request, &body)?.sign(key)?;
                *stage = Stage::Closing(closed);
            }
        }

        Ok(self
            .rfqs
            .values()
            .filter_map(|stage| match stage {
                Stage::Opening(tx) | Stage::Closing(tx) => Some(tx.clone()),
                Stage::Open { .. } => None,
            })
            .collect())
    }
}

fn open_tx(
    request: Hash,
    rfq_duration_ms: u64,
    now_ms: u64,
    key: &PrivateKey,
) -> Result<Transaction, TxError> {
    let body = OpenRfq {
        opened_at_ms: now_ms,
        closes_at_ms: now_ms.saturating_add(rfq_duration_ms),
    };
    Transaction::stage(TxType::Open, request, &body)?.sign(key)
}
