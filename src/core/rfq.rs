//! RFQ payload bodies carried inside transactions and persisted in the ledger tables.

use crate::crypto::key_pair::Signature;
use crate::types::address::Address;
use borsh::{BorshDeserialize, BorshSerialize};

/// Token descriptor for one side of an RFQ.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// Signable body of a request transaction.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignableData {
    pub requestor_id: String,
    /// Amount of base token, in the token's smallest unit.
    pub base_token_amount: u128,
    pub base_token: Token,
    pub quote_token: Token,
    /// How long the request stays open for quoting.
    pub rfq_duration_ms: u64,
}

/// Record stored in the `rfqRequests` table.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RfqRequest {
    /// Signer recovered from the request transaction.
    pub from: Address,
    pub data: SignableData,
    pub signature: Signature,
}

/// Body of an open transaction. Written by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct OpenRfq {
    pub opened_at_ms: u64,
    pub closes_at_ms: u64,
}

/// Body of a closed transaction. Written by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ClosedRfq {
    pub closed_at_ms: u64,
}

/// Body of a quote transaction.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Quote {
    pub quoter_id: String,
    pub quote_token_amount: u128,
}
