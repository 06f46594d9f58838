//! Block and transaction acceptance rules.
//!
//! Provides the [`Validator`] trait the ledger calls before appending and
//! [`BlockValidator`] as the default implementation.

use crate::core::block::{Block, Header};
use crate::core::transaction::{Transaction, TxError, TxType};
use crate::types::address::Address;
use crate::types::hash::Hash;

/// What a validator may see of the chain it is validating against.
#[derive(Clone, Copy, Debug)]
pub struct ChainView<'a> {
    /// Current head, `None` before genesis.
    pub tip: Option<&'a Header>,
    pub tip_hash: Hash,
    /// Validator allowed to extend this chain, taken from genesis.
    pub authority: Option<Address>,
}

/// Pluggable acceptance rules. Implementations must be thread-safe.
pub trait Validator: Send + Sync {
    /// Checks a block against the current head.
    fn validate_block(&self, block: &Block, chain: &ChainView<'_>)
    -> Result<(), BlockValidatorError>;

    /// Checks one transaction. `signer_authority` is the address validator-only
    /// stages must be signed by, when known.
    fn validate_tx(
        &self,
        tx: &Transaction,
        signer_authority: Option<&Address>,
    ) -> Result<(), BlockValidatorError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockValidatorError {
    #[error("invalid block height: expected {expected}, got {actual}")]
    InvalidHeight { expected: u64, actual: u64 },

    #[error("parent hash mismatch: expected {expected}, got {actual}")]
    ParentHashMismatch { expected: Hash, actual: Hash },

    #[error("genesis block must have a zero parent hash")]
    InvalidGenesisParent,

    #[error("missing block signature")]
    MissingSignature,

    #[error("invalid block signature")]
    InvalidSignature,

    #[error("block signed by {actual}, chain authority is {expected}")]
    UnauthorizedValidator { expected: Address, actual: Address },

    #[error("merkle root mismatch")]
    MerkleRootMismatch,

    #[error("transaction {hash}: {source}")]
    InvalidTransaction {
        hash: Hash,
        #[source]
        source: TxError,
    },

    #[error("transaction {hash}: {kind} must be signed by validator {expected}, got {actual}")]
    UnauthorizedStage {
        hash: Hash,
        kind: TxType,
        expected: Address,
        actual: Address,
    },
}

/// Default rules:
/// - genesis has height 0 and a zero parent; later blocks have height tip+1
///   and the tip's hash as parent;
/// - blocks after genesis are produced by the chain authority;
/// - the header signature recovers to the block's validator key;
/// - the merkle root matches the carried transactions.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockValidator;

impl Validator for BlockValidator {
    fn validate_block(
        &self,
        block: &Block,
        chain: &ChainView<'_>,
    ) -> Result<(), BlockValidatorError> {
        match chain.tip {
            None => {
                if block.height() != 0 {
                    return Err(BlockValidatorError::InvalidHeight {
                        expected: 0,
                        actual: block.height(),
                    });
                }
                if !block.header.parent_hash.is_zero() {
                    return Err(BlockValidatorError::InvalidGenesisParent);
                }
            }
            Some(tip) => {
                let expected = tip.height + 1;
                if block.height() != expected {
                    return Err(BlockValidatorError::InvalidHeight {
                        expected,
                        actual: block.height(),
                    });
                }
                if block.header.parent_hash != chain.tip_hash {
                    return Err(BlockValidatorError::ParentHashMismatch {
                        expected: chain.tip_hash,
                        actual: block.header.parent_hash,
                    });
                }
                if let Some(authority) = chain.authority
                    && block.validator.address() != authority
                {
                    return Err(BlockValidatorError::UnauthorizedValidator {
                        expected: authority,
                        actual: block.validator.address(),
                    });
                }
            }
        }

        let signature = block
            .header
            .signature
            .as_ref()
            .ok_or(BlockValidatorError::MissingSignature)?;
        if !signature.verify(&block.hash(), &block.validator.address()) {
            return Err(BlockValidatorError::InvalidSignature);
        }

        if block.header.tx_hash != block.computed_tx_hash() {
            return Err(BlockValidatorError::MerkleRootMismatch);
        }

        Ok(())
    }

    fn validate_tx(
        &self,
        tx: &Transaction,
        signer_authority: Option<&Address>,
    ) -> Result<(), BlockValidatorError> {
        let hash = tx.hash();
        let signer = tx
            .verify()
            .map_err(|source| BlockValidatorError::InvalidTransaction { hash, source })?;

        // verify() already rejected unknown tags
        if let Ok(kind) = tx.kind()
            && kind.is_validator_stage()
            && let Some(expected) = signer_authority
            && signer != *expected
        {
            return Err(BlockValidatorError::UnauthorizedStage {
                hash,
                kind,
                expected: *expected,
                actual: signer,
            });
        }
        Ok(())
    }
}
