//! The ledger: header chain, block storage and the RFQ lifecycle tables.
//!
//! [`Blockchain`] is the only writer of chain state. Appends are serialized by
//! an internal `RwLock`; the current head is also published through an
//! `ArcSwapOption` so hot-path readers never take the lock.

use crate::core::block::{Block, FullBlock, Header, MalformedBlock};
use crate::core::rfq::{OpenRfq, RfqRequest};
use crate::core::transaction::{Transaction, TxError, TxType};
use crate::core::validator::{BlockValidator, BlockValidatorError, ChainView, Validator};
use crate::crypto::key_pair::{CryptoError, PrivateKey};
use crate::storage::storage_trait::{KvStore, StorageError, WriteBatch};
use crate::storage::table::Table;
use crate::types::address::Address;
use crate::types::hash::Hash;
use crate::{debug, info, warn};
use arc_swap::ArcSwapOption;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const RFQ_REQUESTS: Table = Table::new("rfqRequests");
pub const OPEN_RFQS: Table = Table::new("openRFQs");
pub const CLOSED_RFQS: Table = Table::new("closedRFQs");
pub const MATCHED_RFQS: Table = Table::new("matchedRFQs");
pub const SETTLED_RFQS: Table = Table::new("settledRFQs");
pub const QUOTES: Table = Table::new("quotes");

const BLOCKS: Table = Table::new("blocks");
const HEIGHTS: Table = Table::new("heights");
const TX_INDEX: Table = Table::new("txIndex");

/// Table a transaction of `kind` is persisted in.
pub fn rfq_table(kind: TxType) -> Table {
    match kind {
        TxType::Request => RFQ_REQUESTS,
        TxType::Open => OPEN_RFQS,
        TxType::Closed => CLOSED_RFQS,
        TxType::Matched => MATCHED_RFQS,
        TxType::Settled => SETTLED_RFQS,
        TxType::Quote => QUOTES,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("block already known: {0}")]
    BlockKnown(Hash),

    #[error("blockchain height [{height}] is less than requested height [{requested}]")]
    HeightOutOfRange { requested: u64, height: i64 },

    #[error("block {0} not found")]
    BlockNotFound(Hash),

    #[error("transaction {0} not found")]
    TxNotFound(Hash),

    #[error("transaction {0} is already on chain")]
    DuplicateTransaction(Hash),

    #[error("chain has no genesis block")]
    EmptyChain,

    #[error(transparent)]
    Malformed(#[from] MalformedBlock),

    #[error("block validation failed: {0}")]
    Validation(#[from] BlockValidatorError),

    #[error(transparent)]
    Transaction(#[from] TxError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("error writing transaction to kv store tables: {0}")]
    TableWrite(#[source] StorageError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl LedgerError {
    /// "Already known" is an expected outcome of gossip, not a failure.
    pub fn is_known(&self) -> bool {
        matches!(self, LedgerError::BlockKnown(_))
    }
}

#[derive(Default)]
struct ChainState {
    headers: Vec<Header>,
    hashes: Vec<Hash>,
    authority: Option<Address>,
}

impl ChainState {
    fn view(&self) -> ChainView<'_> {
        ChainView {
            tip: self.headers.last(),
            tip_hash: self.hashes.last().copied().unwrap_or_default(),
            authority: self.authority,
        }
    }

    fn height(&self) -> i64 {
        self.headers.len() as i64 - 1
    }

    fn contains(&self, height: u64, hash: &Hash) -> bool {
        self.hashes.get(height as usize) == Some(hash)
    }
}

pub struct Blockchain<S: KvStore, V: Validator = BlockValidator> {
    store: S,
    validator: V,
    state: RwLock<ChainState>,
    head: ArcSwapOption<Header>,
}

impl<S: KvStore, V: Validator> Blockchain<S, V> {
    /// Opens the ledger over `store`, reloading any chain already persisted in it.
    pub fn new(store: S, validator: V) -> Result<Self, LedgerError> {
        let chain = Blockchain {
            store,
            validator,
            state: RwLock::new(ChainState::default()),
            head: ArcSwapOption::empty(),
        };
        chain.restore()?;
        Ok(chain)
    }

    fn restore(&self) -> Result<(), LedgerError> {
        let mut state = self.write_state();
        let mut height = 0u64;
        while let Some(raw) = HEIGHTS.get(&self.store, &height.to_be_bytes())? {
            let hash = Hash::from_slice(&raw)
                .ok_or_else(|| LedgerError::Corrupt(format!("height index {height}")))?;
            let block = self.load_block(&hash)?;
            if state.headers.is_empty() {
                state.authority = Some(block.validator.address());
            }
            state.headers.push(block.header);
            state.hashes.push(hash);
            height += 1;
        }
        if let Some(tip) = state.headers.last() {
            self.head.store(Some(Arc::new(tip.clone())));
            info!("Restored {} blocks from storage, height={}", height, state.height());
        }
        Ok(())
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ChainState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ChainState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Chain length minus one, -1 before genesis.
    pub fn height(&self) -> i64 {
        self.read_state().height()
    }

    /// Number of headers held, i.e. the chain length.
    pub fn header_count(&self) -> usize {
        self.read_state().headers.len()
    }

    /// Lock-free snapshot of the head header.
    pub fn current_header(&self) -> Option<Arc<Header>> {
        self.head.load_full()
    }

    /// Validator of the genesis block, the only key allowed to extend the chain.
    pub fn authority(&self) -> Option<Address> {
        self.read_state().authority
    }

    pub fn get_block_header(&self, height: u64) -> Result<Header, LedgerError> {
        let state = self.read_state();
        state
            .headers
            .get(height as usize)
            .cloned()
            .ok_or(LedgerError::HeightOutOfRange {
                requested: height,
                height: state.height(),
            })
    }

    pub fn get_block(&self, height: u64) -> Result<Block, LedgerError> {
        let hash = {
            let state = self.read_state();
            *state
                .hashes
                .get(height as usize)
                .ok_or(LedgerError::HeightOutOfRange {
                    requested: height,
                    height: state.height(),
                })?
        };
        self.load_block(&hash)
    }

    pub fn get_block_by_hash(&self, hash: &Hash) -> Result<Block, LedgerError> {
        self.load_block(hash)
    }

    pub fn has_block(&self, hash: &Hash) -> Result<bool, LedgerError> {
        Ok(BLOCKS.get(&self.store, hash.as_slice())?.is_some())
    }

    fn load_block(&self, hash: &Hash) -> Result<Block, LedgerError> {
        let raw = BLOCKS
            .get(&self.store, hash.as_slice())?
            .ok_or(LedgerError::BlockNotFound(*hash))?;
        borsh::from_slice(&raw).map_err(|e| LedgerError::Corrupt(format!("block {hash}: {e}")))
    }

    pub fn has_transaction(&self, hash: &Hash) -> Result<bool, LedgerError> {
        Ok(TX_INDEX.get(&self.store, hash.as_slice())?.is_some())
    }

    /// Looks up a committed transaction through the tx-hash → block-hash index.
    pub fn get_tx_by_hash(&self, hash: &Hash) -> Result<Transaction, LedgerError> {
        let raw = TX_INDEX
            .get(&self.store, hash.as_slice())?
            .ok_or(LedgerError::TxNotFound(*hash))?;
        let block_hash = Hash::from_slice(&raw)
            .ok_or_else(|| LedgerError::Corrupt(format!("tx index {hash}")))?;
        self.load_block(&block_hash)?
            .transactions
            .into_iter()
            .find(|tx| tx.hash() == *hash)
            .ok_or(LedgerError::TxNotFound(*hash))
    }

    /// Builds and signs a block extending the current head. Nothing is committed.
    pub fn build_block(
        &self,
        key: &PrivateKey,
        transactions: Vec<Transaction>,
        timestamp: u64,
    ) -> Result<Block, LedgerError> {
        let head = self.current_header().ok_or(LedgerError::EmptyChain)?;
        let mut block = Block::from_prev_header(&head, transactions, key.public_key(), timestamp);
        block.sign(key)?;
        Ok(block)
    }

    /// Admission check for transactions arriving outside a block.
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<(), LedgerError> {
        let authority = self.authority();
        self.validator.validate_tx(tx, authority.as_ref())?;
        Ok(())
    }

    /// Entry point for blocks that arrive as header/body pairs.
    pub fn verify_full_block(&self, block: FullBlock) -> Result<(), LedgerError> {
        let block = block.into_block().inspect_err(|e| warn!("Rejected block: {e}"))?;
        self.verify_block(block)
    }

    /// Validates `block` against the head and appends it.
    ///
    /// A rejected block leaves chain and tables untouched.
    pub fn verify_block(&self, block: Block) -> Result<(), LedgerError> {
        let mut state = self.write_state();
        let hash = block.hash();

        if state.contains(block.height(), &hash) {
            debug!("Block {} at height {} already known", hash.short(), block.height());
            return Err(LedgerError::BlockKnown(hash));
        }

        if let Err(e) = self.check_block(&state, &block) {
            warn!(
                "Rejected block {} at height {}: {e}",
                hash.short(),
                block.height()
            );
            return Err(e);
        }

        self.commit(&mut state, block, hash)
    }

    fn check_block(&self, state: &ChainState, block: &Block) -> Result<(), LedgerError> {
        self.validator.validate_block(block, &state.view())?;

        let signer = block.validator.address();
        let mut seen = HashSet::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            self.validator.validate_tx(tx, Some(&signer))?;
            let tx_hash = tx.hash();
            if !seen.insert(tx_hash) || self.has_transaction(&tx_hash)? {
                return Err(LedgerError::DuplicateTransaction(tx_hash));
            }
        }
        Ok(())
    }

    fn commit(&self, state: &mut ChainState, block: Block, hash: Hash) -> Result<(), LedgerError> {
        let mut batch = WriteBatch::new();
        for tx in &block.transactions {
            let (table, key, value) = rfq_record(tx)?;
            table.batch_put(&mut batch, &key, value);
            TX_INDEX.batch_put(&mut batch, tx.hash().as_slice(), hash.0.to_vec());
        }
        let encoded =
            borsh::to_vec(&block).map_err(|e| LedgerError::Corrupt(format!("encode block: {e}")))?;
        BLOCKS.batch_put(&mut batch, hash.as_slice(), encoded);
        HEIGHTS.batch_put(&mut batch, &block.height().to_be_bytes(), hash.0.to_vec());
        self.store.write(batch)?;

        if state.headers.is_empty() {
            state.authority = Some(block.validator.address());
        }
        state.headers.push(block.header.clone());
        state.hashes.push(hash);
        self.head.store(Some(Arc::new(block.header)));

        info!(
            "Added block height={} hash={} transactions={}",
            state.height(),
            hash.short(),
            block.transactions.len()
        );
        Ok(())
    }

    /// Persists `tx` in the table for its lifecycle stage.
    ///
    /// Requests are keyed by their own hash, every later stage by the hash of the
    /// request it refers to. An unknown tag writes nothing.
    pub fn write_rfq_txs(&self, tx: &Transaction) -> Result<(), LedgerError> {
        let (table, key, value) = rfq_record(tx)?;
        let _state = self.write_state();
        table
            .put(&self.store, &key, &value)
            .map_err(LedgerError::TableWrite)
    }

    /// Every stored request. The first undecodable record aborts the listing.
    pub fn get_rfq_requests(&self) -> Result<Vec<RfqRequest>, LedgerError> {
        let _state = self.read_state();
        RFQ_REQUESTS
            .iter(&self.store)
            .map(|item| {
                let (key, value) = item?;
                borsh::from_slice::<RfqRequest>(&value).map_err(|e| {
                    LedgerError::Corrupt(format!("rfq request {}: {e}", hex::encode(key)))
                })
            })
            .collect()
    }

    pub fn get_rfq_request(&self, hash: &Hash) -> Result<Option<RfqRequest>, LedgerError> {
        RFQ_REQUESTS
            .get(&self.store, hash.as_slice())?
            .map(|raw| {
                borsh::from_slice(&raw)
                    .map_err(|e| LedgerError::Corrupt(format!("rfq request {hash}: {e}")))
            })
            .transpose()
    }

    /// Requests with no closed record yet, each with its open record if one
    /// was committed. Used to resume the lifecycle after a restart.
    pub fn get_unclosed_rfqs(&self) -> Result<Vec<UnclosedRfq>, LedgerError> {
        let _state = self.read_state();
        let mut unclosed = Vec::new();
        for item in RFQ_REQUESTS.iter(&self.store) {
            let (key, value) = item?;
            let request = Hash::from_slice(&key).ok_or_else(|| {
                LedgerError::Corrupt(format!("rfq request key {}", hex::encode(&key)))
            })?;
            if CLOSED_RFQS.get(&self.store, &key)?.is_some() {
                continue;
            }
            let record: RfqRequest = borsh::from_slice(&value)
                .map_err(|e| LedgerError::Corrupt(format!("rfq request {request}: {e}")))?;
            let opened = OPEN_RFQS
                .get(&self.store, &key)?
                .map(|raw| borsh::from_slice::<OpenRfq>(&raw))
                .transpose()
                .map_err(|e| LedgerError::Corrupt(format!("open rfq {request}: {e}")))?;
            unclosed.push(UnclosedRfq {
                request,
                rfq_duration_ms: record.data.rfq_duration_ms,
                opened,
            });
        }
        Ok(unclosed)
    }

    /// Raw payload recorded for `request` at a later lifecycle stage.
    pub fn get_stage_record(
        &self,
        kind: TxType,
        request: &Hash,
    ) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(rfq_table(kind).get(&self.store, request.as_slice())?)
    }
}

/// A committed request that has not reached the closed stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnclosedRfq {
    pub request: Hash,
    pub rfq_duration_ms: u64,
    pub opened: Option<OpenRfq>,
}

/// Table, key and value `tx` is persisted under.
fn rfq_record(tx: &Transaction) -> Result<(Table, Vec<u8>, Vec<u8>), LedgerError> {
    let kind = tx.kind()?;
    match kind {
        TxType::Request => {
            let signature = tx.signature.ok_or(TxError::Unsigned)?;
            let record = RfqRequest {
                from: tx.sender()?,
                data: tx.signable_data()?,
                signature,
            };
            let value = borsh::to_vec(&record)
                .map_err(|e| LedgerError::Corrupt(format!("encode rfq request: {e}")))?;
            Ok((RFQ_REQUESTS, tx.hash().0.to_vec(), value))
        }
        TxType::Open | TxType::Closed | TxType::Matched | TxType::Settled | TxType::Quote => {
            let reference = tx
                .reference_tx_hash
                .ok_or(TxError::MissingReference(kind))?;
            Ok((rfq_table(kind), reference.0.to_vec(), tx.data.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rfq::Quote;
    use crate::storage::memory_storage::MemoryStore;
    use crate::storage::rocksdb_storage::RocksDbStore;
    use crate::utils::test_utils::utils::{
        chain_with_genesis, empty_chain, extend_chain, sample_request, signed_request,
    };

    #[test]
    fn empty_chain_has_height_minus_one() {
        let chain = empty_chain();
        assert_eq!(chain.height(), -1);
        assert_eq!(chain.header_count(), 0);
        assert!(chain.current_header().is_none());
        assert!(matches!(
            chain.build_block(&PrivateKey::new(), vec![], 0),
            Err(LedgerError::EmptyChain)
        ));
    }

    #[test]
    fn genesis_is_accepted_and_sets_authority() {
        let key = PrivateKey::new();
        let chain = chain_with_genesis(&key);
        assert_eq!(chain.height(), 0);
        assert_eq!(chain.authority(), Some(key.public_key().address()));

        let head = chain.current_header().unwrap();
        assert_eq!(head.height, 0);
        assert!(head.parent_hash.is_zero());
        assert_eq!(chain.get_block_header(0).unwrap(), *head);
    }

    #[test]
    fn blocks_extend_height() {
        let key = PrivateKey::new();
        let chain = chain_with_genesis(&key);
        extend_chain(&chain, &key, 3);
        assert_eq!(chain.height(), 3);
        assert_eq!(chain.header_count(), 4);

        let block = chain.get_block(2).unwrap();
        assert_eq!(block.height(), 2);
        assert_eq!(block.header.parent_hash, chain.get_block_header(1).unwrap().hash());
        assert_eq!(chain.get_block_by_hash(&block.hash()).unwrap(), block);
    }

    #[test]
    fn get_block_beyond_height_fails_without_mutation() {
        let key = PrivateKey::new();
        let chain = chain_with_genesis(&key);
        extend_chain(&chain, &key, 1);

        let err = chain.get_block(5).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::HeightOutOfRange {
                requested: 5,
                height: 1
            }
        ));
        assert!(err.to_string().contains("is less than requested height"));
        assert!(chain.get_block_header(2).is_err());
        assert_eq!(chain.height(), 1);
    }

    #[test]
    fn known_block_is_reported_as_known() {
        let key = PrivateKey::new();
        let chain = chain_with_genesis(&key);
        let block = chain.build_block(&key, vec![], 1).unwrap();
        chain.verify_block(block.clone()).unwrap();

        let err = chain.verify_block(block).unwrap_err();
        assert!(err.is_known());
        assert_eq!(chain.height(), 1);
    }

    #[test]
    fn rejected_block_changes_nothing() {
        let key = PrivateKey::new();
        let chain = chain_with_genesis(&key);
        let stored = chain.store().len();

        let mut block = chain
            .build_block(&key, vec![signed_request(&key, "1")], 1)
            .unwrap();
        block.header.parent_hash = Hash::digest(b"fork");
        block.sign(&key).unwrap();

        let err = chain.verify_block(block).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(BlockValidatorError::ParentHashMismatch { .. })
        ));
        assert_eq!(chain.height(), 0);
        assert_eq!(chain.store().len(), stored);
        assert!(chain.get_rfq_requests().unwrap().is_empty());
    }

    #[test]
    fn foreign_validator_cannot_extend_chain() {
        let key = PrivateKey::new();
        let chain = chain_with_genesis(&key);
        let block = chain.build_block(&PrivateKey::new(), vec![], 1).unwrap();
        assert!(matches!(
            chain.verify_block(block),
            Err(LedgerError::Validation(
                BlockValidatorError::UnauthorizedValidator { .. }
            ))
        ));
    }

    #[test]
    fn block_with_unsigned_transaction_is_rejected() {
        let key = PrivateKey::new();
        let chain = chain_with_genesis(&key);
        let unsigned = Transaction::request(&sample_request("1")).unwrap();
        let block = chain.build_block(&key, vec![unsigned], 1).unwrap();
        assert!(chain.verify_block(block).is_err());
        assert_eq!(chain.height(), 0);
    }

    #[test]
    fn transaction_cannot_be_committed_twice() {
        let key = PrivateKey::new();
        let chain = chain_with_genesis(&key);
        let tx = signed_request(&key, "1");

        let block = chain.build_block(&key, vec![tx.clone()], 1).unwrap();
        chain.verify_block(block).unwrap();

        let again = chain.build_block(&key, vec![tx.clone()], 2).unwrap();
        assert!(matches!(
            chain.verify_block(again),
            Err(LedgerError::DuplicateTransaction(h)) if h == tx.hash()
        ));

        let doubled = chain.build_block(&key, vec![tx.clone(), tx], 2).unwrap();
        assert!(chain.verify_block(doubled).is_err());
        assert_eq!(chain.height(), 1);
    }

    #[test]
    fn missing_header_is_rejected() {
        let key = PrivateKey::new();
        let chain = chain_with_genesis(&key);
        let mut full = chain.build_block(&key, vec![], 1).unwrap().into_full();
        full.header = None;

        let err = chain.verify_full_block(full).unwrap_err();
        assert!(err.to_string().contains("header is nil"));
        assert_eq!(chain.height(), 0);
    }

    #[test]
    fn missing_body_is_rejected() {
        let key = PrivateKey::new();
        let chain = chain_with_genesis(&key);
        let full = FullBlock {
            header: None,
            body: None,
        };
        let err = chain.verify_full_block(full).unwrap_err();
        assert!(err.to_string().contains("block is nil"));
        assert_eq!(chain.height(), 0);
    }

    #[test]
    fn request_is_written_and_listed() {
        let chain = empty_chain();
        let key = PrivateKey::new();
        let tx = signed_request(&key, "119");

        chain.write_rfq_txs(&tx).unwrap();

        let requests = chain.get_rfq_requests().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].data.requestor_id, "119");
        assert_eq!(requests[0].data.base_token_amount, 1_000_000_000_000_000_000);
        assert_eq!(requests[0].from, key.public_key().address());
        assert_eq!(chain.get_rfq_request(&tx.hash()).unwrap(), Some(requests[0].clone()));
    }

    #[test]
    fn unknown_type_writes_nothing() {
        let chain = empty_chain();
        let mut tx = signed_request(&PrivateKey::new(), "1");
        tx.tx_type = 99;

        let err = chain.write_rfq_txs(&tx).unwrap_err();
        assert_eq!(err.to_string(), "unknown transaction type: 99");
        assert!(chain.store().is_empty());
    }

    #[test]
    fn stages_are_keyed_by_reference() {
        let chain = empty_chain();
        let validator = PrivateKey::new();
        let request = signed_request(&PrivateKey::new(), "7");
        let reference = request.hash();

        let open = OpenRfq {
            opened_at_ms: 1,
            closes_at_ms: 2,
        };
        let open_tx = Transaction::stage(TxType::Open, reference, &open)
            .unwrap()
            .sign(&validator)
            .unwrap();
        let quote = Quote {
            quoter_id: "mm".into(),
            quote_token_amount: 42,
        };
        let quote_tx = Transaction::stage(TxType::Quote, reference, &quote)
            .unwrap()
            .sign(&PrivateKey::new())
            .unwrap();

        chain.write_rfq_txs(&open_tx).unwrap();
        chain.write_rfq_txs(&quote_tx).unwrap();

        assert_eq!(
            chain.get_stage_record(TxType::Open, &reference).unwrap(),
            Some(open_tx.data.clone())
        );
        assert_eq!(
            chain.get_stage_record(TxType::Quote, &reference).unwrap(),
            Some(quote_tx.data.clone())
        );
        assert_eq!(chain.get_stage_record(TxType::Closed, &reference).unwrap(), None);
        assert!(chain.get_rfq_requests().unwrap().is_empty());
    }

    #[test]
    fn committed_block_fills_tables_and_index() {
        let key = PrivateKey::new();
        let chain = chain_with_genesis(&key);
        let request = signed_request(&PrivateKey::new(), "55");
        let open_tx = Transaction::stage(
            TxType::Open,
            request.hash(),
            &OpenRfq {
                opened_at_ms: 0,
                closes_at_ms: 10,
            },
        )
        .unwrap()
        .sign(&key)
        .unwrap();

        let block = chain
            .build_block(&key, vec![request.clone(), open_tx.clone()], 1)
            .unwrap();
        chain.verify_block(block).unwrap();

        assert_eq!(chain.get_rfq_requests().unwrap().len(), 1);
        assert!(
            chain
                .get_stage_record(TxType::Open, &request.hash())
                .unwrap()
                .is_some()
        );
        assert!(chain.has_transaction(&open_tx.hash()).unwrap());
        assert_eq!(chain.get_tx_by_hash(&request.hash()).unwrap(), request);
        assert!(matches!(
            chain.get_tx_by_hash(&Hash::digest(b"none")),
            Err(LedgerError::TxNotFound(_))
        ));
    }

    #[test]
    fn corrupt_request_aborts_listing() {
        let chain = empty_chain();
        chain
            .write_rfq_txs(&signed_request(&PrivateKey::new(), "1"))
            .unwrap();
        RFQ_REQUESTS
            .put(chain.store(), b"garbage", &[0xff, 0x01])
            .unwrap();
        assert!(matches!(
            chain.get_rfq_requests(),
            Err(LedgerError::Corrupt(_))
        ));
    }

    #[test]
    fn chain_reloads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger");
        let key = PrivateKey::new();
        let tip = {
            let chain =
                Blockchain::new(RocksDbStore::open(&path, false).unwrap(), BlockValidator).unwrap();
            chain.verify_block(Block::genesis(&key, 0).unwrap()).unwrap();
            for i in 1..=2 {
                let block = chain.build_block(&key, vec![], i).unwrap();
                chain.verify_block(block).unwrap();
            }
            chain.current_header().unwrap().hash()
        };

        let chain =
            Blockchain::new(RocksDbStore::open(&path, false).unwrap(), BlockValidator).unwrap();
        assert_eq!(chain.height(), 2);
        assert_eq!(chain.current_header().unwrap().hash(), tip);
        assert_eq!(chain.authority(), Some(key.public_key().address()));

        let next = chain.build_block(&key, vec![], 3).unwrap();
        chain.verify_block(next).unwrap();
        assert_eq!(chain.height(), 3);
    }

    #[test]
    fn memory_store_chain_has_no_history() {
        let chain = Blockchain::new(MemoryStore::new(), BlockValidator).unwrap();
        assert_eq!(chain.height(), -1);
    }
}
