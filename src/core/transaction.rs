//! Typed, signed transaction envelope for the RFQ lifecycle.
//!
//! The wire form carries the type as a raw tag so that peers running a newer
//! tag set still decode the envelope; [`Transaction::kind`] is the only place
//! the tag becomes a [`TxType`].

use crate::core::rfq::SignableData;
use crate::crypto::key_pair::{CryptoError, PrivateKey, Signature};
use crate::types::address::Address;
use crate::types::hash::Hash;
use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt;

const TX_HASH_DOMAIN: &[u8] = b"RFQ_TX";

/// Lifecycle stage a transaction records.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxType {
    Request = 0,
    Open = 1,
    Closed = 2,
    Matched = 3,
    Settled = 4,
    Quote = 5,
}

impl TxType {
    pub const ALL: [TxType; 6] = [
        TxType::Request,
        TxType::Open,
        TxType::Closed,
        TxType::Matched,
        TxType::Settled,
        TxType::Quote,
    ];

    /// Stages that only the validator may sign.
    pub fn is_validator_stage(self) -> bool {
        matches!(
            self,
            TxType::Open | TxType::Closed | TxType::Matched | TxType::Settled
        )
    }
}

impl TryFrom<u8> for TxType {
    type Error = TxError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(TxType::Request),
            1 => Ok(TxType::Open),
            2 => Ok(TxType::Closed),
            3 => Ok(TxType::Matched),
            4 => Ok(TxType::Settled),
            5 => Ok(TxType::Quote),
            other => Err(TxError::UnknownTxType(other)),
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxType::Request => "RequestTx",
            TxType::Open => "OpenTx",
            TxType::Closed => "ClosedTx",
            TxType::Matched => "MatchedTx",
            TxType::Settled => "SettledTx",
            TxType::Quote => "QuoteTx",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxError {
    #[error("unknown transaction type: {0}")]
    UnknownTxType(u8),
    #[error("transaction is not signed")]
    Unsigned,
    #[error("{0} requires a reference transaction hash")]
    MissingReference(TxType),
    #[error("{0} must not carry a reference transaction hash")]
    UnexpectedReference(TxType),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("bad signature: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub tx_type: u8,
    /// Originating request, set on every stage except the request itself.
    pub reference_tx_hash: Option<Hash>,
    pub data: Vec<u8>,
    pub signature: Option<Signature>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("tx_type", &self.tx_type)
            .field("hash", &self.hash().short())
            .field("reference_tx_hash", &self.reference_tx_hash.map(|h| h.short()))
            .field("data_len", &self.data.len())
            .finish()
    }
}

impl Transaction {
    /// Creates an unsigned transaction.
    pub fn new(tx_type: TxType, reference_tx_hash: Option<Hash>, data: Vec<u8>) -> Self {
        Transaction {
            tx_type: tx_type as u8,
            reference_tx_hash,
            data,
            signature: None,
        }
    }

    /// Unsigned request transaction for `data`.
    pub fn request(data: &SignableData) -> Result<Self, TxError> {
        let bytes = borsh::to_vec(data).map_err(|e| TxError::InvalidPayload(e.to_string()))?;
        Ok(Self::new(TxType::Request, None, bytes))
    }

    /// Unsigned stage transaction pointing back at `request`.
    pub fn stage<T: BorshSerialize>(
        tx_type: TxType,
        request: Hash,
        body: &T,
    ) -> Result<Self, TxError> {
        let bytes = borsh::to_vec(body).map_err(|e| TxError::InvalidPayload(e.to_string()))?;
        Ok(Self::new(tx_type, Some(request), bytes))
    }

    /// Signs the transaction hash, replacing any previous signature.
    pub fn sign(mut self, key: &PrivateKey) -> Result<Self, TxError> {
        self.signature = Some(key.sign(&self.hash())?);
        Ok(self)
    }

    /// Hash over type, reference and payload. The signature is not covered,
    /// so signing never changes a transaction's identity.
    pub fn hash(&self) -> Hash {
        let mut h = Hash::keccak();
        h.update(TX_HASH_DOMAIN);
        h.update(&[self.tx_type]);
        match &self.reference_tx_hash {
            Some(reference) => {
                h.update(&[1]);
                h.update(reference.as_slice());
            }
            None => h.update(&[0]),
        }
        h.update(&(self.data.len() as u64).to_le_bytes());
        h.update(&self.data);
        h.finalize()
    }

    pub fn kind(&self) -> Result<TxType, TxError> {
        TxType::try_from(self.tx_type)
    }

    /// Recovers the signer's address.
    pub fn sender(&self) -> Result<Address, TxError> {
        let signature = self.signature.as_ref().ok_or(TxError::Unsigned)?;
        Ok(signature.recover(&self.hash())?)
    }

    /// Checks tag, reference shape, payload and signature. Returns the signer.
    pub fn verify(&self) -> Result<Address, TxError> {
        let kind = self.kind()?;
        match (kind, self.reference_tx_hash) {
            (TxType::Request, Some(_)) => return Err(TxError::UnexpectedReference(kind)),
            (TxType::Request, None) => {
                self.signable_data()?;
            }
            (_, None) => return Err(TxError::MissingReference(kind)),
            (_, Some(_)) => {}
        }
        self.sender()
    }

    /// Decodes the request body. Only meaningful for [`TxType::Request`].
    pub fn signable_data(&self) -> Result<SignableData, TxError> {
        self.decode_payload()
    }

    pub fn decode_payload<T: BorshDeserialize>(&self) -> Result<T, TxError> {
        borsh::from_slice(&self.data).map_err(|e| TxError::InvalidPayload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rfq::{OpenRfq, Quote};
    use crate::utils::test_utils::utils::{sample_request, signed_request};

    #[test]
    fn signer_is_recovered() {
        let key = PrivateKey::new();
        let tx = signed_request(&key, "119");
        assert_eq!(tx.verify().unwrap(), key.public_key().address());
        assert_eq!(tx.sender().unwrap(), key.public_key().address());
    }

    #[test]
    fn signing_does_not_change_hash() {
        let key = PrivateKey::new();
        let unsigned = Transaction::request(&sample_request("1")).unwrap();
        let hash = unsigned.hash();
        let signed = unsigned.sign(&key).unwrap();
        assert_eq!(signed.hash(), hash);
    }

    #[test]
    fn mutated_payload_fails_verification() {
        let key = PrivateKey::new();
        let tx = signed_request(&key, "119");

        let mut data = sample_request("119");
        data.base_token_amount += 1;
        let mut tampered = tx.clone();
        tampered.data = borsh::to_vec(&data).unwrap();

        // Either recovery fails outright or it lands on some other address.
        match tampered.verify() {
            Ok(addr) => assert_ne!(addr, key.public_key().address()),
            Err(e) => assert!(matches!(e, TxError::Crypto(_))),
        }
    }

    #[test]
    fn unsigned_transaction_is_rejected() {
        let tx = Transaction::request(&sample_request("1")).unwrap();
        assert_eq!(tx.verify(), Err(TxError::Unsigned));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let key = PrivateKey::new();
        let mut tx = signed_request(&key, "1");
        tx.tx_type = 42;
        assert_eq!(tx.kind(), Err(TxError::UnknownTxType(42)));
        assert_eq!(tx.verify(), Err(TxError::UnknownTxType(42)));
        assert_eq!(
            TxError::UnknownTxType(42).to_string(),
            "unknown transaction type: 42"
        );
    }

    #[test]
    fn reference_shape_is_enforced() {
        let key = PrivateKey::new();

        let mut request = Transaction::request(&sample_request("1")).unwrap();
        request.reference_tx_hash = Some(Hash::digest(b"x"));
        let request = request.sign(&key).unwrap();
        assert_eq!(
            request.verify(),
            Err(TxError::UnexpectedReference(TxType::Request))
        );

        let quote = Transaction::new(TxType::Quote, None, Vec::new())
            .sign(&key)
            .unwrap();
        assert_eq!(quote.verify(), Err(TxError::MissingReference(TxType::Quote)));
    }

    #[test]
    fn request_payload_must_decode() {
        let key = PrivateKey::new();
        let tx = Transaction::new(TxType::Request, None, vec![1, 2, 3])
            .sign(&key)
            .unwrap();
        assert!(matches!(tx.verify(), Err(TxError::InvalidPayload(_))));
    }

    #[test]
    fn stage_payload_round_trips() {
        let key = PrivateKey::new();
        let reference = Hash::digest(b"request");
        let open = OpenRfq {
            opened_at_ms: 10,
            closes_at_ms: 20,
        };
        let tx = Transaction::stage(TxType::Open, reference, &open)
            .unwrap()
            .sign(&key)
            .unwrap();
        assert_eq!(tx.reference_tx_hash, Some(reference));
        assert_eq!(tx.decode_payload::<OpenRfq>().unwrap(), open);
        assert!(tx.verify().is_ok());

        let quote = Quote {
            quoter_id: "mm-1".into(),
            quote_token_amount: 5,
        };
        let tx = Transaction::stage(TxType::Quote, reference, &quote).unwrap();
        assert_eq!(tx.decode_payload::<Quote>().unwrap(), quote);
    }

    #[test]
    fn encoding_preserves_hash_and_signature() {
        let key = PrivateKey::new();
        let tx = signed_request(&key, "7");
        let bytes = borsh::to_vec(&tx).unwrap();
        let decoded: Transaction = borsh::from_slice(&bytes).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.hash(), tx.hash());
        assert_eq!(decoded.verify().unwrap(), key.public_key().address());
    }

    #[test]
    fn tag_conversion_covers_all_types() {
        for kind in TxType::ALL {
            assert_eq!(TxType::try_from(kind as u8), Ok(kind));
        }
        assert!(TxType::Open.is_validator_stage());
        assert!(!TxType::Quote.is_validator_stage());
        assert!(!TxType::Request.is_validator_stage());
    }
}
