//! `PayTree` client: Merkle commitment generation and per-payment proofs
//! for the plain scheme and its two pruning optimizations.
//!
//! Proofs are generated on demand from the in-memory tree rather than
//! precomputed, matching the reference client: precomputing every
//! `(i, leaf, siblings)` triple ahead of time does not improve throughput
//! but does grow memory linearly in the payment count, since sibling lists
//! are `O(log n)` each.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;

use tollgate_core::crypto::keys::PrivateKey;
use tollgate_core::crypto::payword::Hash32;
use tollgate_core::crypto::paytree::{first_opt, second_opt, tree_depth, MerkleTree};
use tollgate_proto::channel::{ChannelScheme, OpenChannelCommon, PaytreeOpenFields};
use tollgate_proto::envelope::Envelope;
use tollgate_proto::payment::PayTreeProof;

use crate::error::ClientError;
use crate::signing::sign_payload;

/// Client-side state for a `PayTree` channel of any of the three
/// subtypes: the tree itself, the per-leaf secrets, and whatever pruning
/// bookkeeping the variant needs to decide what to omit on the next proof.
#[derive(Debug, Clone)]
pub struct PaytreeChannel {
    tree: MerkleTree,
    secrets: Vec<Vec<u8>>,
    max_i: u64,
    unit_value: u64,
    variant: ChannelScheme,
    last_verified_index: Option<u64>,
    node_cache: HashMap<String, Hash32>,
}

impl PaytreeChannel {
    /// Generates `max_i + 1` random 32-byte leaf secrets and builds the
    /// Merkle tree over them for the given pruning `variant`.
    ///
    /// # Panics
    ///
    /// Panics if `variant` is not one of the three `PayTree` schemes.
    #[must_use]
    pub fn generate(max_i: u64, unit_value: u64, variant: ChannelScheme) -> Self {
        assert!(
            matches!(
                variant,
                ChannelScheme::Paytree | ChannelScheme::PaytreeFirstOpt | ChannelScheme::PaytreeSecondOpt
            ),
            "variant must be a PayTree scheme"
        );
        let leaf_count = usize::try_from(max_i.saturating_add(1)).expect("leaf count fits usize");
        let mut secrets = Vec::with_capacity(leaf_count);
        for _ in 0..leaf_count {
            let mut secret = vec![0u8; 32];
            rand::rngs::OsRng.fill_bytes(&mut secret);
            secrets.push(secret);
        }
        let tree = MerkleTree::build(&secrets);
        Self {
            tree,
            secrets,
            max_i,
            unit_value,
            variant,
            last_verified_index: None,
            node_cache: HashMap::new(),
        }
    }

    /// The commitment root, to be announced at channel open.
    #[must_use]
    pub fn root_b64(&self) -> String {
        STANDARD.encode(self.tree.root())
    }

    /// The open-channel fields declaring this tree's commitment.
    #[must_use]
    pub fn open_fields(&self) -> PaytreeOpenFields {
        PaytreeOpenFields {
            root_b64: self.root_b64(),
            unit_value: self.unit_value,
            max_i: self.max_i,
        }
    }

    /// Produces the payment payload for index `i`, pruned according to
    /// this channel's variant. Mutates the client's own pruning bookkeeping
    /// to reflect `i` as the most recently sent proof, mirroring what the
    /// vendor's cache will look like after it accepts this proof.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::IndexOutOfRange`] if `i` exceeds `max_i`.
    pub fn payment(&mut self, channel_id: &str, i: u64) -> Result<PayTreeProof, ClientError> {
        if i > self.max_i {
            return Err(ClientError::IndexOutOfRange {
                requested: i,
                max: self.max_i,
            });
        }
        let depth = tree_depth(self.max_i.saturating_add(1));
        let full_siblings = self.tree.full_siblings(i);
        let leaf_secret = &self.secrets[usize::try_from(i).expect("index fits usize")];

        let siblings_b64 = match self.variant {
            ChannelScheme::Paytree => full_siblings.iter().map(|s| STANDARD.encode(s)).collect(),
            ChannelScheme::PaytreeFirstOpt => {
                let send_levels = first_opt::compute_send_levels(i, self.last_verified_index, depth);
                self.last_verified_index = Some(i);
                send_levels
                    .into_iter()
                    .map(|level| STANDARD.encode(full_siblings[usize::try_from(level).expect("fits")]))
                    .collect()
            }
            ChannelScheme::PaytreeSecondOpt => {
                let send_levels = second_opt::compute_send_levels(i, depth, &self.node_cache);
                let leaf_hash = tollgate_core::crypto::paytree::hash_leaf(leaf_secret);
                self.node_cache = second_opt::update_cache(&self.node_cache, i, &leaf_hash, &full_siblings);
                send_levels
                    .into_iter()
                    .map(|level| STANDARD.encode(full_siblings[usize::try_from(level).expect("fits")]))
                    .collect()
            }
            _ => unreachable!("variant validated at construction"),
        };

        Ok(PayTreeProof {
            channel_id: channel_id.to_owned(),
            i,
            leaf_b64: STANDARD.encode(leaf_secret),
            siblings_b64,
        })
    }
}

/// Builds the signed open-channel envelope for a fresh `PayTree` channel of
/// any of the three subtypes.
///
/// # Errors
///
/// Returns [`ClientError::Canonical`] if the payload cannot be encoded.
pub fn build_open_envelope(
    key: &PrivateKey,
    common: &OpenChannelCommon,
    paytree: &PaytreeOpenFields,
    variant: ChannelScheme,
) -> Result<Envelope, ClientError> {
    let field_prefix = match variant {
        ChannelScheme::Paytree => "paytree",
        ChannelScheme::PaytreeFirstOpt => "paytree_first_opt",
        ChannelScheme::PaytreeSecondOpt => "paytree_second_opt",
        _ => unreachable!("variant validated by caller"),
    };
    let mut value = serde_json::Map::new();
    value.insert(
        "client_public_key_der_b64".to_owned(),
        serde_json::Value::String(common.client_public_key_der_b64.clone()),
    );
    value.insert(
        "vendor_public_key_der_b64".to_owned(),
        serde_json::Value::String(common.vendor_public_key_der_b64.clone()),
    );
    value.insert("amount".to_owned(), serde_json::Value::Number(common.amount.into()));
    value.insert(
        format!("{field_prefix}_root_b64"),
        serde_json::Value::String(paytree.root_b64.clone()),
    );
    value.insert(
        format!("{field_prefix}_unit_value"),
        serde_json::Value::Number(paytree.unit_value.into()),
    );
    value.insert(
        format!("{field_prefix}_max_i"),
        serde_json::Value::Number(paytree.max_i.into()),
    );
    sign_payload(key, &serde_json::Value::Object(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::crypto::paytree::{hash_leaf, verify_proof};

    fn decode_hash32(value_b64: &str) -> Hash32 {
        STANDARD.decode(value_b64).expect("valid base64").try_into().expect("32 bytes")
    }

    #[test]
    fn plain_proof_verifies_full_sibling_list() {
        let mut channel = PaytreeChannel::generate(7, 5, ChannelScheme::Paytree);
        let root = decode_hash32(&channel.root_b64());
        let depth = tree_depth(8);
        for i in [0, 3, 7] {
            let proof = channel.payment("chan", i).expect("in range");
            assert_eq!(proof.siblings_b64.len(), usize::try_from(depth).unwrap());
            let leaf = hash_leaf(&decode_hash32_any(&proof.leaf_b64));
            let siblings: Vec<Hash32> = proof.siblings_b64.iter().map(|s| decode_hash32(s)).collect();
            assert!(verify_proof(&root, &leaf, &siblings, i, depth));
        }
    }

    fn decode_hash32_any(value_b64: &str) -> Vec<u8> {
        STANDARD.decode(value_b64).expect("valid base64")
    }

    #[test]
    fn first_opt_proof_shrinks_after_first_payment() {
        let mut channel = PaytreeChannel::generate(7, 5, ChannelScheme::PaytreeFirstOpt);
        let first = channel.payment("chan", 0).expect("in range");
        let depth = tree_depth(8) as usize;
        assert_eq!(first.siblings_b64.len(), depth);
        let second = channel.payment("chan", 1).expect("in range");
        assert!(second.siblings_b64.len() < depth);
    }

    #[test]
    fn second_opt_proof_shrinks_as_cache_grows() {
        let mut channel = PaytreeChannel::generate(7, 5, ChannelScheme::PaytreeSecondOpt);
        let first = channel.payment("chan", 0).expect("in range");
        let depth = tree_depth(8) as usize;
        assert_eq!(first.siblings_b64.len(), depth);
        let second = channel.payment("chan", 1).expect("in range");
        assert!(second.siblings_b64.len() < depth);
    }

    #[test]
    fn rejects_index_beyond_max_i() {
        let mut channel = PaytreeChannel::generate(3, 5, ChannelScheme::Paytree);
        let err = channel.payment("chan", 4).expect_err("out of range");
        assert!(matches!(err, ClientError::IndexOutOfRange { requested: 4, max: 3 }));
    }
}
