//! Block, header and the wire-level header/body split.

use crate::core::transaction::Transaction;
use crate::crypto::key_pair::{CryptoError, PrivateKey, PublicKey, Signature};
use crate::types::address::Address;
use crate::types::hash::Hash;
use crate::types::merkle_tree::MerkleTree;
use borsh::{BorshDeserialize, BorshSerialize};

/// Header version written by this node.
pub const BLOCK_VERSION: u32 = 1;

/// Block header. Its hash covers every field except `signature`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Header {
    pub version: u32,
    /// Hash of the parent header, zero for genesis
    pub parent_hash: Hash,
    /// Genesis = 0
    pub height: u64,
    /// Unix timestamp in nanoseconds
    pub timestamp: u64,
    /// Merkle root of the block's transaction hashes
    pub tx_hash: Hash,
    /// Validator signature over [`Header::hash`]
    pub signature: Option<Signature>,
}

impl Header {
    pub fn hash(&self) -> Hash {
        let mut h = Hash::keccak();
        h.update(b"RFQ_HEADER");
        h.update(&self.version.to_le_bytes());
        h.update(self.parent_hash.as_slice());
        h.update(&self.height.to_le_bytes());
        h.update(&self.timestamp.to_le_bytes());
        h.update(self.tx_hash.as_slice());
        h.finalize()
    }

    /// Address recovered from the header signature.
    pub fn signer(&self) -> Result<Address, CryptoError> {
        self.signature
            .as_ref()
            .ok_or(CryptoError::MalformedSignature)?
            .recover(&self.hash())
    }
}

/// Error for wire blocks missing one of their halves.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed block: {0}")]
pub struct MalformedBlock(pub &'static str);

/// Transactions plus the producing validator's key, without the header.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Body {
    pub transactions: Vec<Transaction>,
    pub validator: PublicKey,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
    pub validator: PublicKey,
}

impl Block {
    /// Unsigned block extending `prev`. The merkle root is filled in from `transactions`.
    pub fn from_prev_header(
        prev: &Header,
        transactions: Vec<Transaction>,
        validator: PublicKey,
        timestamp: u64,
    ) -> Self {
        let header = Header {
            version: BLOCK_VERSION,
            parent_hash: prev.hash(),
            height: prev.height + 1,
            timestamp,
            tx_hash: MerkleTree::from_transactions(&transactions),
            signature: None,
        };
        Block {
            header,
            transactions,
            validator,
        }
    }

    /// Signed genesis block: zero parent, height 0, no transactions.
    pub fn genesis(key: &PrivateKey, timestamp: u64) -> Result<Self, CryptoError> {
        let mut block = Block {
            header: Header {
                version: BLOCK_VERSION,
                parent_hash: Hash::zero(),
                height: 0,
                timestamp,
                tx_hash: Hash::zero(),
                signature: None,
            },
            transactions: Vec::new(),
            validator: key.public_key(),
        };
        block.sign(key)?;
        Ok(block)
    }

    /// Signs the header and records the signer as the block's validator.
    pub fn sign(&mut self, key: &PrivateKey) -> Result<(), CryptoError> {
        self.validator = key.public_key();
        self.header.signature = Some(key.sign(&self.header.hash())?);
        Ok(())
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Merkle root recomputed from the carried transactions.
    pub fn computed_tx_hash(&self) -> Hash {
        MerkleTree::from_transactions(&self.transactions)
    }

    pub fn from_parts(header: Header, body: Body) -> Self {
        Block {
            header,
            transactions: body.transactions,
            validator: body.validator,
        }
    }

    pub fn into_full(self) -> FullBlock {
        FullBlock {
            header: Some(self.header),
            body: Some(Body {
                transactions: self.transactions,
                validator: self.validator,
            }),
        }
    }
}

/// Header/body pair as it travels in a `Blocks` reply. Either half may be absent
/// on a malformed message.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FullBlock {
    pub header: Option<Header>,
    pub body: Option<Body>,
}

impl FullBlock {
    pub fn into_block(self) -> Result<Block, MalformedBlock> {
        let body = self.body.ok_or(MalformedBlock("block is nil"))?;
        let header = self.header.ok_or(MalformedBlock("header is nil"))?;
        Ok(Block::from_parts(header, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::utils::signed_request;

    fn block_with_txs(n: usize) -> (PrivateKey, Block) {
        let key = PrivateKey::new();
        let genesis = Block::genesis(&key, 1).unwrap();
        let txs = (0..n)
            .map(|i| signed_request(&PrivateKey::new(), &i.to_string()))
            .collect();
        let mut block = Block::from_prev_header(&genesis.header, txs, key.public_key(), 2);
        block.sign(&key).unwrap();
        (key, block)
    }

    #[test]
    fn genesis_shape() {
        let key = PrivateKey::new();
        let genesis = Block::genesis(&key, 0).unwrap();
        assert_eq!(genesis.height(), 0);
        assert!(genesis.header.parent_hash.is_zero());
        assert!(genesis.transactions.is_empty());
        assert_eq!(genesis.header.signer().unwrap(), key.public_key().address());
    }

    #[test]
    fn from_prev_header_links_to_parent() {
        let key = PrivateKey::new();
        let genesis = Block::genesis(&key, 0).unwrap();
        let next = Block::from_prev_header(&genesis.header, vec![], key.public_key(), 1);
        assert_eq!(next.height(), 1);
        assert_eq!(next.header.parent_hash, genesis.hash());
        assert_eq!(next.header.tx_hash, Hash::zero());
    }

    #[test]
    fn signature_is_not_part_of_hash() {
        let (key, mut block) = block_with_txs(2);
        let hash = block.hash();
        block.header.signature = None;
        assert_eq!(block.hash(), hash);
        block.sign(&key).unwrap();
        assert_eq!(block.hash(), hash);
    }

    #[test]
    fn signer_matches_validator() {
        let (key, block) = block_with_txs(3);
        assert_eq!(block.header.signer().unwrap(), key.public_key().address());
        assert_eq!(block.validator, key.public_key());
    }

    #[test]
    fn merkle_root_tracks_transactions() {
        let (_, block) = block_with_txs(3);
        assert_eq!(block.header.tx_hash, block.computed_tx_hash());

        let mut tampered = block.clone();
        tampered.transactions.pop();
        assert_ne!(tampered.header.tx_hash, tampered.computed_tx_hash());
    }

    #[test]
    fn encode_decode_keeps_hash_and_contents() {
        let (_, block) = block_with_txs(4);
        let bytes = borsh::to_vec(&block).unwrap();
        let decoded: Block = borsh::from_slice(&bytes).unwrap();

        assert_eq!(decoded.hash(), block.hash());
        assert_eq!(decoded.header, block.header);
        assert_eq!(decoded.transactions, block.transactions);
        assert_eq!(decoded.validator, block.validator);
    }

    #[test]
    fn body_encode_decode() {
        let (_, block) = block_with_txs(2);
        let full = block.clone().into_full();
        let bytes = borsh::to_vec(&full.body).unwrap();
        let body: Option<Body> = borsh::from_slice(&bytes).unwrap();
        let body = body.unwrap();
        assert_eq!(body.transactions, block.transactions);
        assert_eq!(body.validator, block.validator);
    }

    #[test]
    fn full_block_round_trip() {
        let (_, block) = block_with_txs(1);
        let rebuilt = block.clone().into_full().into_block().unwrap();
        assert_eq!(rebuilt, block);
    }

    #[test]
    fn full_block_missing_halves() {
        let (_, block) = block_with_txs(0);
        let mut full = block.into_full();
        full.header = None;
        assert_eq!(
            full.clone().into_block().unwrap_err().to_string(),
            "malformed block: header is nil"
        );
        full.body = None;
        assert_eq!(
            full.into_block().unwrap_err().to_string(),
            "malformed block: block is nil"
        );
    }
}
