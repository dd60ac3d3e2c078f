//! `PayTree` Merkle commitments: the plain scheme plus its two pruning
//! optimizations.

pub mod first_opt;
pub mod second_opt;

use sha2::{Digest, Sha256};

use crate::crypto::payword::Hash32;

/// Hashes a single leaf secret.
#[must_use]
pub fn hash_leaf(secret: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.finalize().into()
}

/// Hashes an interior node from its two children, left then right.
#[must_use]
pub fn hash_node(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Smallest power of two `>= n`, with `next_power_of_two(0) == 1`.
#[must_use]
pub fn next_power_of_two(n: u64) -> u64 {
    if n <= 1 {
        1
    } else {
        1u64 << (u64::BITS - (n - 1).leading_zeros())
    }
}

/// Tree depth for `m` leaves: `ceil(log2(m))`.
#[must_use]
pub fn tree_depth(m: u64) -> u32 {
    next_power_of_two(m).trailing_zeros()
}

/// A complete binary Merkle tree, leaves padded up to the next power of two
/// by duplicating the last leaf (matching the reference implementation;
/// this differs from Merkle-tree crates that reject non-power-of-two input
/// outright).
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Levels from leaves (`levels[0]`) to root (`levels[last]`).
    levels: Vec<Vec<Hash32>>,
}

impl MerkleTree {
    /// Builds a tree over `leaf_secrets`, one leaf per secret.
    ///
    /// # Panics
    ///
    /// Panics if `leaf_secrets` is empty.
    #[must_use]
    pub fn build(leaf_secrets: &[Vec<u8>]) -> Self {
        assert!(!leaf_secrets.is_empty(), "at least one leaf required");
        let mut leaves: Vec<Hash32> = leaf_secrets.iter().map(|s| hash_leaf(s)).collect();
        let padded_len = usize::try_from(next_power_of_two(
            u64::try_from(leaves.len()).expect("leaf count fits u64"),
        ))
        .expect("padded length fits usize");
        let last = *leaves.last().expect("non-empty");
        leaves.resize(padded_len, last);

        let mut levels = vec![leaves];
        while levels.last().expect("at least one level").len() > 1 {
            let prev = levels.last().expect("at least one level");
            let next: Vec<Hash32> = prev
                .chunks_exact(2)
                .map(|pair| hash_node(&pair[0], &pair[1]))
                .collect();
            levels.push(next);
        }
        Self { levels }
    }

    /// The commitment root.
    #[must_use]
    pub fn root(&self) -> Hash32 {
        self.levels.last().expect("at least one level")[0]
    }

    /// Tree depth (number of sibling hashes in a full proof).
    #[must_use]
    pub fn depth(&self) -> u32 {
        u32::try_from(self.levels.len() - 1).expect("depth fits u32")
    }

    /// Full, unpruned sibling list for leaf index `i`, bottom level first.
    ///
    /// # Panics
    ///
    /// Panics if `i` is outside the padded leaf range.
    #[must_use]
    pub fn full_siblings(&self, i: u64) -> Vec<Hash32> {
        let depth = self.levels.len() - 1;
        let mut siblings = Vec::with_capacity(depth);
        let mut index = usize::try_from(i).expect("index fits usize");
        for level in &self.levels[..depth] {
            siblings.push(level[index ^ 1]);
            index /= 2;
        }
        siblings
    }
}

/// Recomputes the root from `leaf`, `siblings` (bottom level first) and
/// index `i`, and compares it against `root`.
///
/// `siblings` must have exactly `depth` entries; a shorter or longer list is
/// rejected outright rather than silently truncated or zero-padded.
#[must_use]
pub fn verify_proof(root: &Hash32, leaf: &Hash32, siblings: &[Hash32], i: u64, depth: u32) -> bool {
    if siblings.len() != usize::try_from(depth).expect("depth fits usize") {
        return false;
    }
    let mut current = *leaf;
    let mut index = i;
    for sibling in siblings {
        current = if index % 2 == 0 {
            hash_node(&current, sibling)
        } else {
            hash_node(sibling, &current)
        };
        index /= 2;
    }
    current == *root
}

/// Owed amount for leaf index `i` at the given per-leaf unit value.
#[must_use]
pub fn compute_owed_amount(i: u64, unit_value: u64) -> u64 {
    i.saturating_mul(unit_value)
}

/// Builds the cache key `"level:position"` used by both pruning schemes.
#[must_use]
pub fn cache_key(level: u32, position: u64) -> String {
    format!("{level}:{position}")
}

/// Longest common prefix, in bits, of the `n`-bit representations of `a`
/// and `b`.
#[must_use]
pub fn longest_common_prefix(a: u64, b: u64, n: u32) -> u32 {
    let diff = a ^ b;
    if diff == 0 {
        return n;
    }
    let bit_length = u64::BITS - diff.leading_zeros();
    n.saturating_sub(bit_length)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| vec![i as u8; 32]).collect()
    }

    #[test]
    fn proof_verifies_for_every_leaf() {
        let leaves = secrets(8);
        let tree = MerkleTree::build(&leaves);
        let root = tree.root();
        for i in 0..8u64 {
            let leaf = hash_leaf(&leaves[i as usize]);
            let siblings = tree.full_siblings(i);
            assert!(verify_proof(&root, &leaf, &siblings, i, tree.depth()));
        }
    }

    #[test]
    fn proof_rejects_wrong_index() {
        let leaves = secrets(8);
        let tree = MerkleTree::build(&leaves);
        let root = tree.root();
        let leaf = hash_leaf(&leaves[2]);
        let siblings = tree.full_siblings(2);
        assert!(!verify_proof(&root, &leaf, &siblings, 3, tree.depth()));
    }

    #[test]
    fn proof_rejects_wrong_length_sibling_list() {
        let leaves = secrets(8);
        let tree = MerkleTree::build(&leaves);
        let root = tree.root();
        let leaf = hash_leaf(&leaves[0]);
        let mut siblings = tree.full_siblings(0);
        siblings.pop();
        assert!(!verify_proof(&root, &leaf, &siblings, 0, tree.depth()));
    }

    #[test]
    fn non_power_of_two_leaf_count_pads_by_duplication() {
        let leaves = secrets(5);
        let tree = MerkleTree::build(&leaves);
        assert_eq!(tree.depth(), 3); // next_power_of_two(5) == 8
        let root = tree.root();
        let leaf = hash_leaf(&leaves[4]);
        let siblings = tree.full_siblings(4);
        assert!(verify_proof(&root, &leaf, &siblings, 4, tree.depth()));
    }

    #[test]
    fn lcp_of_equal_values_is_full_width() {
        assert_eq!(longest_common_prefix(5, 5, 4), 4);
    }

    #[test]
    fn lcp_detects_differing_high_bit() {
        // 4-bit: 0b0000 vs 0b1000 differ at the top bit -> lcp == 0
        assert_eq!(longest_common_prefix(0, 8, 4), 0);
    }
}
