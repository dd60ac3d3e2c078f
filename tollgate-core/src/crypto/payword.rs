//! `PayWord` SHA-256 hash chains, with client-side midpoint pebbling.
//!
//! Given a random 32-byte seed `w_0` and chain length `N`, `w_i =
//! SHA-256(w_{i-1})`. The commitment root is `w_N`; the token revealed for
//! payment counter `k` (`1 <= k <= N`) is `w_{N-k}`.

use sha2::{Digest, Sha256};

/// 32-byte SHA-256 output.
pub type Hash32 = [u8; 32];

/// Hashes `input` once with SHA-256.
#[must_use]
pub fn hash_bytes(input: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

/// Applies SHA-256 to `input` `n` times in sequence.
#[must_use]
pub fn hash_n(input: &Hash32, n: u64) -> Hash32 {
    let mut current = *input;
    for _ in 0..n {
        current = hash_bytes(&current);
    }
    current
}

/// Builds the full chain `[w_0, w_1, ..., w_n]` from seed `w_0`.
///
/// Only used by the client, which holds the seed; the vendor and issuer
/// only ever see `w_n` (the root) and individual revealed tokens.
#[must_use]
pub fn build_hash_chain(seed: Hash32, n: u64) -> Vec<Hash32> {
    let mut chain = Vec::with_capacity(
        usize::try_from(n).unwrap_or(usize::MAX).saturating_add(1),
    );
    chain.push(seed);
    let mut current = seed;
    for _ in 0..n {
        current = hash_bytes(&current);
        chain.push(current);
    }
    chain
}

/// Verifies a token against the published root: `SHA-256^k(token) == root`.
#[must_use]
pub fn verify_token_against_root(token: &Hash32, k: u64, root: &Hash32) -> bool {
    hash_n(token, k) == *root
}

/// Verifies a token incrementally against a previously accepted token:
/// `SHA-256^(k - prev_k)(token) == prev_token`. Cheaper than
/// [`verify_token_against_root`] when `k - prev_k` is small, since it avoids
/// re-hashing from the start of the chain.
///
/// # Panics
///
/// Panics if `k <= prev_k`; callers must have already enforced strict
/// monotonicity before calling this.
#[must_use]
pub fn verify_token_incremental(token: &Hash32, k: u64, prev_token: &Hash32, prev_k: u64) -> bool {
    assert!(k > prev_k, "incremental verification requires k > prev_k");
    hash_n(token, k - prev_k) == *prev_token
}

/// Amount owed for chain counter `k` at the given per-step unit value.
#[must_use]
pub fn compute_cumulative_owed_amount(k: u64, unit_value: u64) -> u64 {
    k.saturating_mul(unit_value)
}

/// Recursively collects up to `pebble_count` midpoint checkpoints of
/// `[lo, hi)` by repeated bisection, depth-first, left-before-right. Ported
/// arithmetic-for-arithmetic from the reference client's pebble selection so
/// that pebble placement is interoperable between independent
/// implementations trading against the same chain.
fn collect_midpoint_pebbles(lo: u64, hi: u64, pebble_count: usize, out: &mut Vec<u64>) {
    if out.len() >= pebble_count || hi <= lo + 1 {
        return;
    }
    let mid = lo + (hi - lo) / 2;
    out.push(mid);
    if out.len() >= pebble_count {
        return;
    }
    collect_midpoint_pebbles(lo, mid, pebble_count, out);
    if out.len() >= pebble_count {
        return;
    }
    collect_midpoint_pebbles(mid, hi, pebble_count, out);
}

/// A client-side cache trading memory for CPU when producing PayWord
/// proofs: instead of walking the whole chain from the seed for every
/// payment, it stores a handful of midpoint checkpoints and hashes forward
/// from the nearest one at or before the requested index.
///
/// This is purely a client optimization; it never changes what the vendor
/// verifies.
#[derive(Debug, Clone)]
pub struct PebbleCache {
    n: u64,
    /// Sorted `(index, hash)` checkpoints, index 0 (the seed) always present.
    pebbles: Vec<(u64, Hash32)>,
}

impl PebbleCache {
    /// Builds a pebble cache for a chain of length `n` seeded by `seed`,
    /// storing up to `pebble_count` interior checkpoints in addition to the
    /// seed itself.
    #[must_use]
    pub fn new(seed: Hash32, n: u64, pebble_count: usize) -> Self {
        let mut indices = vec![0u64];
        collect_midpoint_pebbles(0, n, pebble_count, &mut indices);
        indices.sort_unstable();
        indices.dedup();

        let mut pebbles = Vec::with_capacity(indices.len());
        let mut cursor = 0u64;
        let mut current = seed;
        for &idx in &indices {
            while cursor < idx {
                current = hash_bytes(&current);
                cursor += 1;
            }
            pebbles.push((idx, current));
        }
        Self { n, pebbles }
    }

    /// Chain length this cache was built for.
    #[must_use]
    pub const fn chain_len(&self) -> u64 {
        self.n
    }

    /// Produces the base64-independent token for payment counter `k`
    /// (`1 <= k <= n`) by hashing forward from the nearest stored
    /// checkpoint at or before `idx = n - k`.
    ///
    /// # Panics
    ///
    /// Panics if `k` is 0 or exceeds the chain length.
    #[must_use]
    pub fn token_for_counter(&self, k: u64) -> Hash32 {
        assert!(k > 0 && k <= self.n, "k out of range for this chain");
        let idx = self.n - k;
        let checkpoint = self
            .pebbles
            .partition_point(|&(pebble_idx, _)| pebble_idx <= idx)
            .checked_sub(1)
            .map(|i| self.pebbles[i])
            .expect("index 0 is always a stored pebble");
        hash_n(&checkpoint.1, idx - checkpoint.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_verifies_at_every_counter() {
        let seed = [7u8; 32];
        let n = 16;
        let chain = build_hash_chain(seed, n);
        let root = chain[usize::try_from(n).expect("fits")];
        for k in 0..=n {
            let idx = n - k;
            let token = chain[usize::try_from(idx).expect("fits")];
            assert!(verify_token_against_root(&token, k, &root));
        }
    }

    #[test]
    fn incremental_verification_matches_direct() {
        let seed = [3u8; 32];
        let n = 10;
        let chain = build_hash_chain(seed, n);
        let prev_k = 2;
        let k = 5;
        let prev_token = chain[usize::try_from(n - prev_k).expect("fits")];
        let token = chain[usize::try_from(n - k).expect("fits")];
        assert!(verify_token_incremental(&token, k, &prev_token, prev_k));
    }

    #[test]
    fn pebble_cache_matches_direct_chain() {
        let seed = [9u8; 32];
        let n = 1000;
        let chain = build_hash_chain(seed, n);
        let cache = PebbleCache::new(seed, n, 8);
        for k in [1, 2, 500, 999, 1000] {
            let expected = chain[usize::try_from(n - k).expect("fits")];
            assert_eq!(cache.token_for_counter(k), expected);
        }
    }

    #[test]
    fn owed_amount_scales_linearly() {
        assert_eq!(compute_cumulative_owed_amount(5, 10), 50);
        assert_eq!(compute_cumulative_owed_amount(0, 10), 0);
    }
}
