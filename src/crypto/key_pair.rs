//! ECDSA key pairs on secp256k1 with recoverable `(V, R, S)` signatures.

use crate::types::address::{ADDRESS_LEN, Address};
use crate::types::hash::Hash;
use borsh::{BorshDeserialize, BorshSerialize};
use k256::EncodedPoint;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use rand_core::OsRng;
use std::fmt;
use std::io::{self, Read, Write};

/// Length of a compressed SEC1 public key.
pub const PUBLIC_KEY_LEN: usize = 33;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("signing failed")]
    SigningFailed,
    #[error("invalid recovery id {0}")]
    InvalidRecoveryId(u8),
    #[error("malformed signature")]
    MalformedSignature,
    #[error("public key recovery failed")]
    RecoveryFailed,
}

/// Recoverable ECDSA signature.
///
/// `v` is the recovery id, `r` and `s` are big-endian scalars.
#[derive(Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Signature {
    pub v: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Signature(v={}, r={}, s={})",
            self.v,
            hex::encode(self.r),
            hex::encode(self.s)
        )
    }
}

impl Signature {
    fn to_parts(&self) -> Result<(EcdsaSignature, RecoveryId), CryptoError> {
        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&self.r);
        rs[32..].copy_from_slice(&self.s);
        let sig = EcdsaSignature::from_slice(&rs).map_err(|_| CryptoError::MalformedSignature)?;
        let recid = RecoveryId::from_byte(self.v).ok_or(CryptoError::InvalidRecoveryId(self.v))?;
        Ok((sig, recid))
    }

    /// Recovers the public key that produced this signature over `hash`.
    pub fn recover_public_key(&self, hash: &Hash) -> Result<PublicKey, CryptoError> {
        let (sig, recid) = self.to_parts()?;
        let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &sig, recid)
            .map_err(|_| CryptoError::RecoveryFailed)?;
        Ok(PublicKey::from_verifying_key(key))
    }

    /// Recovers the signer address.
    pub fn recover(&self, hash: &Hash) -> Result<Address, CryptoError> {
        Ok(self.recover_public_key(hash)?.address())
    }

    /// Returns `true` when the signature over `hash` recovers to `address`.
    pub fn verify(&self, hash: &Hash, address: &Address) -> bool {
        matches!(self.recover(hash), Ok(recovered) if recovered == *address)
    }
}

/// Private key for signing transactions and blocks. Never serialized.
#[derive(Clone)]
pub struct PrivateKey {
    key: SigningKey,
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({})", self.public_key().address())
    }
}

impl PrivateKey {
    /// Generates a new random private key using OS-provided entropy.
    pub fn new() -> Self {
        Self {
            key: SigningKey::random(&mut OsRng),
        }
    }

    /// Returns `None` if the bytes are not a valid secp256k1 scalar.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        SigningKey::from_slice(bytes).ok().map(|key| Self { key })
    }

    /// Parses a hex encoded 32-byte scalar, with or without `0x`.
    pub fn from_hex(text: &str) -> Result<Self, CryptoError> {
        let digits = text.trim().strip_prefix("0x").unwrap_or(text.trim());
        let bytes = zeroize::Zeroizing::new(
            hex::decode(digits).map_err(|_| CryptoError::InvalidPrivateKey)?,
        );
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidPrivateKey);
        }
        Self::from_bytes(&bytes).ok_or(CryptoError::InvalidPrivateKey)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_verifying_key(*self.key.verifying_key())
    }

    /// Signs a 32-byte digest.
    pub fn sign(&self, hash: &Hash) -> Result<Signature, CryptoError> {
        let (sig, recid) = self
            .key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|_| CryptoError::SigningFailed)?;
        let bytes = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(Signature {
            v: recid.to_byte(),
            r,
            s,
        })
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

/// Public key with its derived address cached.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
    address: Address,
}

impl PublicKey {
    fn from_verifying_key(key: VerifyingKey) -> Self {
        let address = address_of(&key.to_encoded_point(false));
        PublicKey { key, address }
    }

    /// Parses a SEC1 encoded key, compressed or not.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key = VerifyingKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self::from_verifying_key(key))
    }

    /// Compressed SEC1 form.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        let mut out = [0u8; PUBLIC_KEY_LEN];
        out.copy_from_slice(self.key.to_encoded_point(true).as_bytes());
        out
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

/// Keccak-256 of the uncompressed point without its `0x04` tag, last 20 bytes.
fn address_of(point: &EncodedPoint) -> Address {
    let digest = Hash::digest(&point.as_bytes()[1..]);
    let mut addr = [0u8; ADDRESS_LEN];
    addr.copy_from_slice(&digest.0[32 - ADDRESS_LEN..]);
    Address(addr)
}

impl BorshSerialize for PublicKey {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())
    }
}

impl BorshDeserialize for PublicKey {
    fn deserialize_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut bytes = [0u8; PUBLIC_KEY_LEN];
        reader.read_exact(&mut bytes)?;
        PublicKey::from_sec1_bytes(&bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}
