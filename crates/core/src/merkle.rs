//! Merkle roots over a block's transaction digests.
//!
//! The tree is a full binary reduction: the leaf count must be a power of two
//! and is never padded. Leaves are transaction digests (already hashed under
//! the leaf tag); interior nodes are `blake3(0x01 || left || right)`.
//!
//! ```text
//!   [A, B, C, D]
//!   [node(A, B), node(C, D)]
//!   [node(node(A, B), node(C, D))]
//! ```
//!
//! A single leaf is reduced against itself: `root([A]) = node(A, A)`.

use crate::hash::{hash_tagged, DomainTag, Hash};
use thiserror::Error;

/// Errors reported when checking a batch size against the tree shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    #[error("leaf count must be at least 1")]
    Empty,

    #[error("leaf count {0} is not a power of two")]
    NotPowerOfTwo(usize),
}

/// Check that `count` leaves reduce to a single root without padding.
pub fn validate_leaf_count(count: usize) -> Result<(), MerkleError> {
    if count == 0 {
        return Err(MerkleError::Empty);
    }
    if !count.is_power_of_two() {
        return Err(MerkleError::NotPowerOfTwo(count));
    }
    Ok(())
}

/// Hash two children into their parent.
pub fn hash_node(left: &Hash, right: &Hash) -> Hash {
    hash_tagged(DomainTag::Node, &[left.as_ref(), right.as_ref()])
}

fn reduce_level(level: &[Hash]) -> Vec<Hash> {
    level
        .chunks_exact(2)
        .map(|pair| hash_node(&pair[0], &pair[1]))
        .collect()
}

/// Compute the merkle root of a power-of-two list of leaf digests.
///
/// Callers validate the leaf count with [`validate_leaf_count`] up front; the
/// chain does this once against its configured batch capacity.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    debug_assert!(
        validate_leaf_count(leaves.len()).is_ok(),
        "merkle_root called with {} leaves",
        leaves.len()
    );

    match leaves {
        [] => Hash::ZERO,
        [only] => hash_node(only, only),
        _ => {
            let mut level = reduce_level(leaves);
            while level.len() > 1 {
                level = reduce_level(&level);
            }
            level[0]
        }
    }
}

/// A merkle inclusion proof for a single leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    /// The leaf being proven.
    pub leaf: Hash,
    /// Sibling hashes from leaf to root.
    pub siblings: Vec<Hash>,
    /// Direction for each sibling (true = sibling is on the right).
    pub directions: Vec<bool>,
}

/// Build an inclusion proof for `leaves[index]`.
///
/// Levels are recomputed from the leaves and dropped afterwards.
pub fn merkle_proof(leaves: &[Hash], index: usize) -> Option<MerkleProof> {
    if index >= leaves.len() || validate_leaf_count(leaves.len()).is_err() {
        return None;
    }

    let leaf = leaves[index];
    if leaves.len() == 1 {
        return Some(MerkleProof {
            leaf,
            siblings: vec![leaf],
            directions: vec![true],
        });
    }

    let mut siblings = Vec::new();
    let mut directions = Vec::new();
    let mut level = leaves.to_vec();
    let mut idx = index;

    while level.len() > 1 {
        let is_left = idx % 2 == 0;
        let sibling_idx = if is_left { idx + 1 } else { idx - 1 };
        siblings.push(level[sibling_idx]);
        directions.push(is_left);
        level = reduce_level(&level);
        idx /= 2;
    }

    Some(MerkleProof {
        leaf,
        siblings,
        directions,
    })
}

/// Verify a merkle proof against a given root.
pub fn verify_proof(root: &Hash, proof: &MerkleProof) -> bool {
    if proof.siblings.len() != proof.directions.len() {
        return false;
    }

    let mut current = proof.leaf;
    for (sibling, sibling_on_right) in proof.siblings.iter().zip(proof.directions.iter()) {
        current = if *sibling_on_right {
            hash_node(&current, sibling)
        } else {
            hash_node(sibling, &current)
        };
    }

    current == *root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash;

    fn make_hashes(n: usize) -> Vec<Hash> {
        (0..n).map(|i| hash(&[i as u8])).collect()
    }

    #[test]
    fn test_validate_leaf_count() {
        assert_eq!(validate_leaf_count(0), Err(MerkleError::Empty));
        assert_eq!(validate_leaf_count(10), Err(MerkleError::NotPowerOfTwo(10)));
        assert_eq!(validate_leaf_count(3), Err(MerkleError::NotPowerOfTwo(3)));
        for n in [1, 2, 4, 8, 16, 1024] {
            assert!(validate_leaf_count(n).is_ok());
        }
    }

    #[test]
    fn test_merkle_root_single_pairs_with_itself() {
        let hashes = make_hashes(1);
        let root = merkle_root(&hashes);
        assert_eq!(root, hash_node(&hashes[0], &hashes[0]));
        assert_ne!(root, hashes[0]);
    }

    #[test]
    fn test_merkle_root_two() {
        let hashes = make_hashes(2);
        let root = merkle_root(&hashes);
        let expected = hash_tagged(DomainTag::Node, &[hashes[0].as_ref(), hashes[1].as_ref()]);
        assert_eq!(root, expected);
    }

    #[test]
    fn test_merkle_root_eight_matches_manual_reduction() {
        let h = make_hashes(8);
        let ab = hash_node(&h[0], &h[1]);
        let cd = hash_node(&h[2], &h[3]);
        let ef = hash_node(&h[4], &h[5]);
        let gh = hash_node(&h[6], &h[7]);
        let expected = hash_node(&hash_node(&ab, &cd), &hash_node(&ef, &gh));
        assert_eq!(merkle_root(&h), expected);
    }

    #[test]
    fn test_merkle_root_deterministic() {
        let hashes = make_hashes(16);
        assert_eq!(merkle_root(&hashes), merkle_root(&hashes));
    }

    #[test]
    fn test_merkle_root_order_matters() {
        for n in [2, 4, 8] {
            let hashes = make_hashes(n);
            let mut swapped = hashes.clone();
            swapped.swap(0, 1);
            assert_ne!(merkle_root(&hashes), merkle_root(&swapped));

            let mut reversed = hashes.clone();
            reversed.reverse();
            assert_ne!(merkle_root(&hashes), merkle_root(&reversed));
        }
    }

    #[test]
    fn test_leaf_digest_never_equals_interior_node() {
        let h = make_hashes(2);
        let as_leaf = hash_tagged(DomainTag::Leaf, &[h[0].as_ref(), h[1].as_ref()]);
        let untagged = hash(&[h[0].as_ref(), h[1].as_ref()].concat());
        assert_ne!(as_leaf, hash_node(&h[0], &h[1]));
        assert_ne!(untagged, hash_node(&h[0], &h[1]));
    }

    #[test]
    fn test_merkle_proof_valid() {
        let hashes = make_hashes(8);
        let root = merkle_root(&hashes);

        for i in 0..hashes.len() {
            let proof = merkle_proof(&hashes, i).unwrap();
            assert_eq!(proof.siblings.len(), 3);
            assert!(verify_proof(&root, &proof));
        }
    }

    #[test]
    fn test_merkle_proof_single_leaf() {
        let hashes = make_hashes(1);
        let proof = merkle_proof(&hashes, 0).unwrap();
        assert!(verify_proof(&merkle_root(&hashes), &proof));
    }

    #[test]
    fn test_merkle_proof_invalid_index() {
        let hashes = make_hashes(4);
        assert!(merkle_proof(&hashes, 10).is_none());
        assert!(merkle_proof(&make_hashes(3), 0).is_none());
    }

    #[test]
    fn test_merkle_proof_wrong_root() {
        let hashes = make_hashes(4);
        let proof = merkle_proof(&hashes, 0).unwrap();

        let wrong_root = hash(b"wrong");
        assert!(!verify_proof(&wrong_root, &proof));
    }
}
