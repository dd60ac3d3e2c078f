//! `PayTree` pruning, first optimization: "reuse authenticators".
//!
//! If the verifier already accepted index `i_prev`, the top `k_max =
//! LCP(i_new, i_prev, depth)` authenticator siblings are unchanged and the
//! client may omit them. The verifier reconstructs the omitted levels from
//! its own cache of siblings from the last accepted proof.
//!
//! The cache is **replaced wholesale** on every accepted proof, not merged:
//! [`update_cache`] returns a fresh map containing only the siblings of the
//! path just accepted. This matches the reference client exactly and means
//! a cache entry from two proofs ago is never consulted once a newer proof
//! has been accepted.

use std::collections::HashMap;

use super::{cache_key, longest_common_prefix};
use crate::crypto::payword::Hash32;

/// Levels the client must send for `i_new`, given the previously verified
/// index (`None` if this is the first payment on the channel).
#[must_use]
pub fn compute_send_levels(i_new: u64, last_verified_index: Option<u64>, depth: u32) -> Vec<u32> {
    match last_verified_index {
        None => (0..depth).collect(),
        Some(prev) => {
            let k_max = longest_common_prefix(i_new, prev, depth);
            let top = depth.saturating_sub(k_max);
            (0..top).collect()
        }
    }
}

/// Reconstructs the full, per-level sibling list for `i` from the siblings
/// the client actually sent (`sent`, one entry per level in `send_levels`,
/// same order) plus the verifier's cache. Returns `None` on any cache miss,
/// signalling that the proof cannot be reconstructed and must be rejected.
#[must_use]
pub fn reconstruct_full_siblings(
    i: u64,
    depth: u32,
    send_levels: &[u32],
    sent: &[Hash32],
    cache: &HashMap<String, Hash32>,
) -> Option<Vec<Hash32>> {
    if send_levels.len() != sent.len() {
        return None;
    }
    let mut full = Vec::with_capacity(usize::try_from(depth).ok()?);
    for level in 0..depth {
        if let Some(pos) = send_levels.iter().position(|&l| l == level) {
            full.push(sent[pos]);
        } else {
            let position = (i >> level) ^ 1;
            let hash = *cache.get(&cache_key(level, position))?;
            full.push(hash);
        }
    }
    Some(full)
}

/// Rebuilds the sibling cache from scratch using the siblings of the path
/// just accepted. Replaces whatever cache the caller held before.
#[must_use]
pub fn update_cache(i: u64, full_siblings: &[Hash32]) -> HashMap<String, Hash32> {
    full_siblings
        .iter()
        .enumerate()
        .map(|(level, sibling)| {
            let level = u32::try_from(level).expect("depth fits u32");
            let position = (i >> level) ^ 1;
            (cache_key(level, position), *sibling)
        })
        .collect()
}

/// Verifies a pruned proof, reconstructing the full sibling list from
/// `cache` before recomputing the root. On success, returns the full
/// sibling list (for settlement submission) and the replacement cache.
#[must_use]
pub fn verify_pruned_proof(
    root: &Hash32,
    leaf: &Hash32,
    i: u64,
    depth: u32,
    last_verified_index: Option<u64>,
    sent_siblings: &[Hash32],
    cache: &HashMap<String, Hash32>,
) -> Option<(Vec<Hash32>, HashMap<String, Hash32>)> {
    let send_levels = compute_send_levels(i, last_verified_index, depth);
    let full = reconstruct_full_siblings(i, depth, &send_levels, sent_siblings, cache)?;
    if super::verify_proof(root, leaf, &full, i, depth) {
        let new_cache = update_cache(i, &full);
        Some((full, new_cache))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::paytree::MerkleTree;

    fn tree_of(n: usize) -> (MerkleTree, Vec<Vec<u8>>) {
        let leaves: Vec<Vec<u8>> = (0..n).map(|i| vec![i as u8; 32]).collect();
        let tree = MerkleTree::build(&leaves);
        (tree, leaves)
    }

    #[test]
    fn first_proof_sends_every_level() {
        let (tree, _) = tree_of(8);
        let levels = compute_send_levels(3, None, tree.depth());
        assert_eq!(levels.len(), usize::try_from(tree.depth()).unwrap());
    }

    #[test]
    fn second_proof_prunes_shared_prefix_and_reconstructs() {
        let (tree, leaves) = tree_of(8);
        let root = tree.root();
        let depth = tree.depth();

        // First payment at i=0, full siblings sent and cached.
        let leaf0 = super::super::hash_leaf(&leaves[0]);
        let full0 = tree.full_siblings(0);
        assert!(super::super::verify_proof(&root, &leaf0, &full0, 0, depth));
        let cache = update_cache(0, &full0);

        // Second payment at i=1 shares the top levels with i=0.
        let leaf1 = super::super::hash_leaf(&leaves[1]);
        let full1 = tree.full_siblings(1);
        let send_levels = compute_send_levels(1, Some(0), depth);
        assert!(send_levels.len() < full1.len());
        let sent: Vec<Hash32> = send_levels.iter().map(|&l| full1[l as usize]).collect();

        let (reconstructed, _) =
            verify_pruned_proof(&root, &leaf1, 1, depth, Some(0), &sent, &cache)
                .expect("reconstructs and verifies");
        assert_eq!(reconstructed, full1);
    }

    #[test]
    fn cache_miss_rejects_proof() {
        let (tree, leaves) = tree_of(8);
        let root = tree.root();
        let depth = tree.depth();
        let leaf1 = super::super::hash_leaf(&leaves[1]);
        let full1 = tree.full_siblings(1);
        let send_levels = compute_send_levels(1, Some(0), depth);
        let sent: Vec<Hash32> = send_levels.iter().map(|&l| full1[l as usize]).collect();
        let empty_cache = HashMap::new();
        assert!(verify_pruned_proof(&root, &leaf1, 1, depth, Some(0), &sent, &empty_cache).is_none());
    }
}
