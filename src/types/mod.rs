//! Primitive types: Keccak-256 `Hash`, 20-byte `Address` and the merkle root helper.

pub mod address;
pub mod hash;
pub mod merkle_tree;
