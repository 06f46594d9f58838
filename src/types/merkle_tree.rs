//! Merkle root over transaction hashes.
//!
//! - An empty list of leaves yields the all-zero hash.
//! - Odd layers duplicate the last node before hashing the pair.
//! - Reduction happens in place.

use crate::core::transaction::Transaction;
use crate::types::hash::Hash;

const MERKLE_NODE_SEPARATION: &[u8] = b"RFQ_MERKLE_NODE";

pub struct MerkleTree;

impl MerkleTree {
    fn hash_pair(left: Hash, right: Hash) -> Hash {
        let mut h = Hash::keccak();
        h.update(MERKLE_NODE_SEPARATION);
        h.update(left.as_slice());
        h.update(right.as_slice());
        h.finalize()
    }

    /// Computes a Merkle root from the provided leaf hashes.
    pub fn from_raw(mut nodes: Vec<Hash>) -> Hash {
        if nodes.is_empty() {
            return Hash::zero();
        }

        let mut len = nodes.len();
        while len > 1 {
            let mut write = 0;
            let mut read = 0;
            while read < len {
                let left = nodes[read];
                let right = if read + 1 < len { nodes[read + 1] } else { left };
                nodes[write] = Self::hash_pair(left, right);
                write += 1;
                read += 2;
            }
            len = write;
        }

        nodes[0]
    }

    /// Merkle root of `txs`, using each transaction's hash as a leaf.
    pub fn from_transactions(txs: &[Transaction]) -> Hash {
        Self::from_raw(txs.iter().map(Transaction::hash).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(data: &[u8]) -> Hash {
        Hash::digest(data)
    }

    #[test]
    fn empty_returns_zero_hash() {
        assert_eq!(MerkleTree::from_raw(Vec::new()), Hash::zero());
        assert_eq!(MerkleTree::from_transactions(&[]), Hash::zero());
    }

    #[test]
    fn single_leaf_returns_leaf() {
        let a = leaf(b"a");
        assert_eq!(MerkleTree::from_raw(vec![a]), a);
    }

    #[test]
    fn even_number_of_leaves_matches_manual_reduction() {
        let (a, b, c, d) = (leaf(b"a"), leaf(b"b"), leaf(b"c"), leaf(b"d"));
        let expected = MerkleTree::hash_pair(MerkleTree::hash_pair(a, b), MerkleTree::hash_pair(c, d));
        assert_eq!(MerkleTree::from_raw(vec![a, b, c, d]), expected);
    }

    #[test]
    fn odd_number_of_leaves_duplicates_last() {
        let (a, b, c) = (leaf(b"a"), leaf(b"b"), leaf(b"c"));
        let expected = MerkleTree::hash_pair(MerkleTree::hash_pair(a, b), MerkleTree::hash_pair(c, c));
        assert_eq!(MerkleTree::from_raw(vec![a, b, c]), expected);
    }

    #[test]
    fn order_matters() {
        let (a, b) = (leaf(b"a"), leaf(b"b"));
        assert_ne!(MerkleTree::from_raw(vec![a, b]), MerkleTree::from_raw(vec![b, a]));
    }
}
