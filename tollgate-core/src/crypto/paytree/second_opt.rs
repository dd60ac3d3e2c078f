//! `PayTree` pruning, second optimization: "reuse authenticators and
//! computed nodes".
//!
//! The verifier caches every node it has ever computed while verifying an
//! accepted path, not just the authenticator siblings. A level is sent only
//! if the corresponding sibling is genuinely absent from the cache. Unlike
//! [`super::first_opt`], the cache here is **merged**, never replaced: every
//! accepted proof only adds entries.

use std::collections::HashMap;

use super::cache_key;
use crate::crypto::payword::Hash32;

/// Levels the client must send for `i`: exactly those whose sibling is not
/// already present in `cache`.
#[must_use]
pub fn compute_send_levels(i: u64, depth: u32, cache: &HashMap<String, Hash32>) -> Vec<u32> {
    (0..depth)
        .filter(|&level| {
            let position = (i >> level) ^ 1;
            !cache.contains_key(&cache_key(level, position))
        })
        .collect()
}

/// Reconstructs the full sibling list for `i` from `sent` (one entry per
/// `send_levels`, same order) plus `cache`. Returns `None` on a cache miss.
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

/// Merges `existing` with every sibling and every computed path node from
/// the just-accepted proof for leaf index `i`.
///
/// Stores, for each level: the sibling at `(level, (i>>level)^1)` and the
/// node this path computes at the next level, `(level+1, i>>(level+1))` —
/// including the leaf itself at `(0, i)`.
#[must_use]
pub fn update_cache(
    existing: &HashMap<String, Hash32>,
    i: u64,
    leaf: &Hash32,
    full_siblings: &[Hash32],
) -> HashMap<String, Hash32> {
    let mut cache = existing.clone();
    cache.insert(cache_key(0, i), *leaf);

    let mut current = *leaf;
    let mut index = i;
    for (level, sibling) in full_siblings.iter().enumerate() {
        let level = u32::try_from(level).expect("depth fits u32");
        let sibling_position = index ^ 1;
        cache.insert(cache_key(level, sibling_position), *sibling);

        current = if index % 2 == 0 {
            super::hash_node(&current, sibling)
        } else {
            super::hash_node(sibling, &current)
        };
        index /= 2;
        cache.insert(cache_key(level + 1, index), current);
    }
    cache
}

/// Verifies a pruned proof, reconstructing the full sibling list before
/// recomputing the root. On success, returns the full sibling list and the
/// merged cache.
#[must_use]
pub fn verify_pruned_proof(
    root: &Hash32,
    leaf: &Hash32,
    i: u64,
    depth: u32,
    sent_siblings: &[Hash32],
    cache: &HashMap<String, Hash32>,
) -> Option<(Vec<Hash32>, HashMap<String, Hash32>)> {
    let send_levels = compute_send_levels(i, depth, cache);
    let full = reconstruct_full_siblings(i, depth, &send_levels, sent_siblings, cache)?;
    if super::verify_proof(root, leaf, &full, i, depth) {
        let new_cache = update_cache(cache, i, leaf, &full);
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
    fn cache_grows_monotonically_and_prunes_more_over_time() {
        let (tree, leaves) = tree_of(8);
        let root = tree.root();
        let depth = tree.depth();
        let mut cache = HashMap::new();

        let leaf0 = super::super::hash_leaf(&leaves[0]);
        let full0 = tree.full_siblings(0);
        let send0 = compute_send_levels(0, depth, &cache);
        assert_eq!(send0.len(), usize::try_from(depth).unwrap());
        let (_, cache) = verify_pruned_proof(&root, &leaf0, 0, depth, &full0, &cache)
            .expect("first proof always verifies");

        let leaf1 = super::super::hash_leaf(&leaves[1]);
        let full1 = tree.full_siblings(1);
        let send1 = compute_send_levels(1, depth, &cache);
        assert!(send1.len() < usize::try_from(depth).unwrap());
        let sent1: Vec<Hash32> = send1.iter().map(|&l| full1[l as usize]).collect();
        let (reconstructed1, cache2) =
            verify_pruned_proof(&root, &leaf1, 1, depth, &sent1, &cache)
                .expect("second proof reconstructs from cache");
        assert_eq!(reconstructed1, full1);
        assert!(cache2.len() >= cache.len());
    }

    #[test]
    fn reconstruction_fails_on_genuine_cache_miss() {
        let (tree, leaves) = tree_of(8);
        let depth = tree.depth();
        let leaf1 = super::super::hash_leaf(&leaves[1]);
        let full1 = tree.full_siblings(1);
        let cache = HashMap::new();
        let send_levels = compute_send_levels(1, depth, &cache);
        // pretend the client only sent half of what's actually required
        let sent: Vec<Hash32> = send_levels
            .iter()
            .take(send_levels.len() / 2)
            .map(|&l| full1[l as usize])
            .collect();
        assert!(reconstruct_full_siblings(1, depth, &send_levels, &sent, &cache).is_none());
    }
}
