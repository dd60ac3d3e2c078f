//! Per-scheme payment submission payloads and settlement DTOs.

use serde::{Deserialize, Serialize};

use crate::envelope::{PayloadB64, SignatureB64};

/// Decoded payload of a signature-variant payment envelope:
/// `{channel_id, cumulative_owed_amount}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SignaturePayment {
    /// Channel the payment applies to.
    pub channel_id: String,
    /// New cumulative amount owed to the vendor.
    pub cumulative_owed_amount: u64,
}

/// Decoded payload of a `PayWord` payment envelope: `{channel_id, k, token_b64}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PaywordPayment {
    /// Channel the payment applies to.
    pub channel_id: String,
    /// Chain counter being revealed.
    pub k: u64,
    /// Base64 hash-chain preimage `w_{N-k}`.
    pub token_b64: String,
}

/// Decoded payload of a `PayTree` payment envelope:
/// `{channel_id, i, leaf_b64, siblings_b64}`. For the pruned variants,
/// `siblings_b64` may contain fewer than `depth` entries; the vendor
/// reconstructs the rest from its cache before verifying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PayTreeProof {
    /// Channel the payment applies to.
    pub channel_id: String,
    /// Leaf index being revealed.
    pub i: u64,
    /// Base64 leaf secret.
    pub leaf_b64: String,
    /// Base64 sibling hashes, bottom level first. Possibly pruned.
    pub siblings_b64: Vec<String>,
}

/// The stored/returned state of a channel's latest accepted payment,
/// returned to a client on an idempotent retry and used internally by the
/// vendor to decide monotonicity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", untagged)]
pub enum PaymentReceipt {
    /// Signature-variant state.
    Signature {
        /// Channel the state belongs to.
        channel_id: String,
        /// Accepted cumulative amount.
        cumulative_owed_amount: u64,
        /// Envelope the client submitted, for idempotent replay checks.
        payload_b64: PayloadB64,
        /// Signature the client submitted, for idempotent replay checks.
        signature_b64: SignatureB64,
        /// RFC 3339 acceptance timestamp.
        created_at: String,
    },
    /// `PayWord`-variant state.
    Payword {
        /// Channel the state belongs to.
        channel_id: String,
        /// Accepted chain counter.
        k: u64,
        /// Accepted token, base64.
        token_b64: String,
        /// RFC 3339 acceptance timestamp.
        created_at: String,
    },
    /// `PayTree`-variant state.
    Paytree {
        /// Channel the state belongs to.
        channel_id: String,
        /// Accepted leaf index.
        i: u64,
        /// Accepted leaf secret, base64.
        leaf_b64: String,
        /// Full (unpruned) sibling list accepted, base64.
        siblings_b64: Vec<String>,
        /// Cached interior-node hashes, second-opt variant only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_cache_b64: Option<std::collections::HashMap<String, String>>,
        /// RFC 3339 acceptance timestamp.
        created_at: String,
    },
}

/// Vendor-signed settlement submission for the `PayWord` scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PaywordSettleRequest {
    /// Vendor's public key, for key-match verification.
    pub vendor_public_key_der_b64: String,
    /// Final accepted chain counter.
    pub k: u64,
    /// Final accepted token, base64.
    pub token_b64: String,
    /// Vendor signature over canonical JSON of `{channel_id, k, token_b64}`.
    pub vendor_signature_b64: SignatureB64,
}

/// Vendor-signed settlement submission for the `PayTree` schemes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PaytreeSettleRequest {
    /// Vendor's public key, for key-match verification.
    pub vendor_public_key_der_b64: String,
    /// Final accepted leaf index.
    pub i: u64,
    /// Final accepted leaf secret, base64.
    pub leaf_b64: String,
    /// Full, unpruned sibling list for `i`, base64.
    pub siblings_b64: Vec<String>,
    /// Vendor signature over canonical JSON of
    /// `{channel_id, i, leaf_b64, siblings_b64}`.
    pub vendor_signature_b64: SignatureB64,
}
