//! 32-byte Keccak-256 hash type.

use borsh::{BorshDeserialize, BorshSerialize};
use sha3::{Digest, Keccak256};
use std::fmt;

/// Keccak-256 hash length in bytes.
pub const HASH_LEN: usize = 32;

/// Fixed-size 32-byte hash identifying headers and transactions.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Default, Hash, Ord, PartialOrd, BorshSerialize, BorshDeserialize,
)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    /// All-zero hash, used as the genesis parent and the empty merkle root.
    pub const fn zero() -> Hash {
        Hash([0u8; HASH_LEN])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Builds a hash from a byte slice of exactly [`HASH_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Hash> {
        let arr: [u8; HASH_LEN] = bytes.try_into().ok()?;
        Some(Hash(arr))
    }

    /// Creates an incremental Keccak-256 builder.
    pub fn keccak() -> HashBuilder {
        HashBuilder::new()
    }

    /// One-shot Keccak-256 of `data`.
    pub fn digest(data: &[u8]) -> Hash {
        let mut h = HashBuilder::new();
        h.update(data);
        h.finalize()
    }

    /// Abbreviated hex form for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Incremental Keccak-256 builder.
pub struct HashBuilder {
    hasher: Keccak256,
}

impl HashBuilder {
    pub fn new() -> Self {
        Self {
            hasher: Keccak256::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finalize(self) -> Hash {
        Hash(self.hasher.finalize().into())
    }
}

impl Default for HashBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_of_empty_input() {
        // Well-known Keccak-256("")
        assert_eq!(
            Hash::digest(b"").to_string(),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn builder_matches_one_shot() {
        let mut h = Hash::keccak();
        h.update(b"hello ");
        h.update(b"world");
        assert_eq!(h.finalize(), Hash::digest(b"hello world"));
    }

    #[test]
    fn from_slice_requires_exact_length() {
        assert!(Hash::from_slice(&[1u8; 31]).is_none());
        assert_eq!(Hash::from_slice(&[7u8; 32]), Some(Hash([7u8; 32])));
    }

    #[test]
    fn zero_hash() {
        assert!(Hash::zero().is_zero());
        assert!(!Hash::digest(b"x").is_zero());
    }
}
