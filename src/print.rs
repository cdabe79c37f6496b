// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Merkle descent witnesses.
//!
//! A [`Print`] records the nodes met while descending from a tree's root
//! toward a key: each node's segment, its rolling subtree hash, the hash of
//! its own value slots, and the slot timestamps. Two replicas compare
//! prints for the same key; the shallowest witness whose subtree hash
//! differs names the subtree they need to reconcile. Prints are plain data
//! and safe to ship across the network.

use crate::nibble::Nibble;
use serde::{Deserialize, Serialize};

/// One node on a root-to-key descent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    /// Nibble segment this node contributes to the path.
    pub segment: Vec<Nibble>,
    /// Rolling hash of the subtree rooted here.
    pub subtree_hash: [u8; 32],
    /// Hash of the node's own slot encoding, after applying the node.
    pub entry_hash: [u8; 32],
    /// Timestamp of the byte slot (0 when the slot never existed).
    pub byte_stamp: i64,
    /// Timestamp of the sub-tree slot (0 when the slot never existed).
    pub tree_stamp: i64,
    /// Mask of slots present at this node, tombstones included.
    pub present: u8,
}

/// Ordered witness list for one key; the last entry is the deepest node
/// whose path covers the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Print {
    /// Nibbles of the key the descent was asked for.
    pub key: Vec<Nibble>,
    pub witnesses: Vec<Witness>,
}

impl Print {
    pub fn new(key: Vec<Nibble>) -> Self {
        Self {
            key,
            witnesses: Vec::new(),
        }
    }

    /// Deepest node reached by the descent, if the tree was non-trivial.
    pub fn deepest(&self) -> Option<&Witness> {
        self.witnesses.last()
    }

    /// Nibble path actually covered by the witnesses.
    pub fn covered(&self) -> Vec<Nibble> {
        let mut path = Vec::new();
        for w in &self.witnesses {
            path.extend_from_slice(&w.segment);
        }
        path
    }

    /// Index of the first witness whose subtree hash disagrees with the
    /// other print, or `None` when the common depth agrees everywhere.
    /// Disagreement at index `i` means the subtree under that node is where
    /// the replicas diverge.
    pub fn divergence(&self, other: &Print) -> Option<usize> {
        self.witnesses
            .iter()
            .zip(other.witnesses.iter())
            .position(|(a, b)| a.subtree_hash != b.subtree_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn witness(segment: Vec<Nibble>, hash_byte: u8) -> Witness {
        Witness {
            segment,
            subtree_hash: [hash_byte; 32],
            entry_hash: [0; 32],
            byte_stamp: 0,
            tree_stamp: 0,
            present: 0,
        }
    }

    #[test]
    fn covered_concatenates_segments() {
        let mut print = Print::new(vec![6, 1, 6, 2]);
        print.witnesses.push(witness(vec![], 0));
        print.witnesses.push(witness(vec![6, 1], 1));
        print.witnesses.push(witness(vec![6, 2], 2));
        assert_eq!(print.covered(), vec![6, 1, 6, 2]);
        assert_eq!(print.deepest().unwrap().subtree_hash, [2; 32]);
    }

    #[test]
    fn divergence_finds_first_mismatch() {
        let mut a = Print::new(vec![1]);
        let mut b = Print::new(vec![1]);
        a.witnesses.push(witness(vec![], 7));
        b.witnesses.push(witness(vec![], 7));
        a.witnesses.push(witness(vec![1], 1));
        b.witnesses.push(witness(vec![1], 2));
        assert_eq!(a.divergence(&b), Some(1));
        assert_eq!(a.divergence(&a), None);
    }

    #[test]
    fn prints_serialize() {
        let mut print = Print::new(vec![6, 1]);
        print.witnesses.push(witness(vec![6, 1], 3));
        let encoded = bincode::serialize(&print).unwrap();
        let decoded: Print = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, print);
    }
}
