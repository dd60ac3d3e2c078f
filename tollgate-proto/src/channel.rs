//! Channel open/close request and response payloads.
//!
//! Variant discrimination follows the design note in the specification this
//! crate implements: a channel's scheme is inferred from which `*_root_b64`
//! field is present on the open payload, never from an explicit tag field.

use serde::{Deserialize, Serialize};

use crate::envelope::{Envelope, PayloadB64, SignatureB64};

/// The three interoperable payment schemes, with the two PayTree pruning
/// variants broken out because their wire fields and cache semantics differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelScheme {
    /// Plain ECDSA monotonic-counter channel.
    Signature,
    /// SHA-256 hash-chain channel.
    Payword,
    /// Merkle-tree channel, no pruning.
    Paytree,
    /// Merkle-tree channel, authenticator-reuse pruning.
    PaytreeFirstOpt,
    /// Merkle-tree channel, authenticator-and-node-reuse pruning.
    PaytreeSecondOpt,
}

impl ChannelScheme {
    /// The URL path segment used for this scheme under
    /// `/issuer/channels/...` and `/vendor/channels/.../...`.
    #[must_use]
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::Signature => "signature",
            Self::Payword => "payword",
            Self::Paytree => "paytree",
            Self::PaytreeFirstOpt => "paytree_first_opt",
            Self::PaytreeSecondOpt => "paytree_second_opt",
        }
    }
}

/// Fields common to every channel-open payload, signed by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OpenChannelCommon {
    /// Base64 DER SubjectPublicKeyInfo of the client key.
    pub client_public_key_der_b64: String,
    /// Base64 DER SubjectPublicKeyInfo of the vendor key.
    pub vendor_public_key_der_b64: String,
    /// Capacity locked into the channel, smallest unit.
    pub amount: u64,
}

/// `PayWord`-specific fields on the open payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PaywordOpenFields {
    /// Base64 32-byte chain terminal hash `w_N`.
    pub payword_root_b64: String,
    /// Value, in the account's smallest unit, of a single chain step.
    pub payword_unit_value: u64,
    /// Chain length; largest acceptable payment counter.
    pub payword_max_k: u64,
    /// Hash algorithm tag; only `"sha256"` is accepted.
    pub payword_hash_alg: String,
}

/// `PayTree`-specific fields on the open payload, generic over the field
/// name prefix used by the plain / first-opt / second-opt subtypes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaytreeOpenFields {
    /// Base64 32-byte Merkle root.
    pub root_b64: String,
    /// Value, in the account's smallest unit, of one leaf.
    pub unit_value: u64,
    /// Largest acceptable leaf index.
    pub max_i: u64,
}

/// A fully parsed channel-open request, tagged by scheme.
///
/// Deserialization is untagged: the scheme is inferred from which root
/// field is present, matching the wire format in the specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenChannelRequestPayload {
    /// Signature channel: no extra fields.
    Signature(OpenChannelCommon),
    /// PayWord channel.
    Payword {
        /// Common fields.
        common: OpenChannelCommon,
        /// PayWord fields.
        payword: PaywordOpenFields,
    },
    /// PayTree channel (plain, first-opt, or second-opt).
    Paytree {
        /// Common fields.
        common: OpenChannelCommon,
        /// Which PayTree subtype this is.
        scheme: ChannelScheme,
        /// PayTree fields.
        paytree: PaytreeOpenFields,
    },
}

impl OpenChannelRequestPayload {
    /// The scheme this payload declares.
    #[must_use]
    pub const fn scheme(&self) -> ChannelScheme {
        match self {
            Self::Signature(_) => ChannelScheme::Signature,
            Self::Payword { .. } => ChannelScheme::Payword,
            Self::Paytree { scheme, .. } => *scheme,
        }
    }

    /// The common fields shared by every variant.
    #[must_use]
    pub const fn common(&self) -> &OpenChannelCommon {
        match self {
            Self::Signature(common) | Self::Payword { common, .. } | Self::Paytree { common, .. } => common,
        }
    }
}

/// Flattened, all-optional wire shape for `POST /issuer/channels*`. The
/// scheme is inferred from which `*_root_b64` group is present, so this
/// struct exists only to be validated and converted into an
/// [`OpenChannelRequestPayload`] via [`TryFrom`] — never matched on
/// directly.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OpenChannelWireRequest {
    /// Base64 DER SubjectPublicKeyInfo of the client key.
    pub client_public_key_der_b64: String,
    /// Base64 DER SubjectPublicKeyInfo of the vendor key.
    pub vendor_public_key_der_b64: String,
    /// Capacity locked into the channel, smallest unit.
    pub amount: u64,
    /// `PayWord` terminal hash, base64.
    #[serde(default)]
    pub payword_root_b64: Option<String>,
    /// `PayWord` per-step value.
    #[serde(default)]
    pub payword_unit_value: Option<u64>,
    /// `PayWord` chain length.
    #[serde(default)]
    pub payword_max_k: Option<u64>,
    /// `PayWord` hash algorithm tag; must be `"sha256"`.
    #[serde(default)]
    pub payword_hash_alg: Option<String>,
    /// `PayTree` (plain) Merkle root, base64.
    #[serde(default)]
    pub paytree_root_b64: Option<String>,
    /// `PayTree` (plain) per-leaf value.
    #[serde(default)]
    pub paytree_unit_value: Option<u64>,
    /// `PayTree` (plain) largest leaf index.
    #[serde(default)]
    pub paytree_max_i: Option<u64>,
    /// `PayTree` first-opt Merkle root, base64.
    #[serde(default)]
    pub paytree_first_opt_root_b64: Option<String>,
    /// `PayTree` first-opt per-leaf value.
    #[serde(default)]
    pub paytree_first_opt_unit_value: Option<u64>,
    /// `PayTree` first-opt largest leaf index.
    #[serde(default)]
    pub paytree_first_opt_max_i: Option<u64>,
    /// `PayTree` second-opt Merkle root, base64.
    #[serde(default)]
    pub paytree_second_opt_root_b64: Option<String>,
    /// `PayTree` second-opt per-leaf value.
    #[serde(default)]
    pub paytree_second_opt_unit_value: Option<u64>,
    /// `PayTree` second-opt largest leaf index.
    #[serde(default)]
    pub paytree_second_opt_max_i: Option<u64>,
}

/// Errors converting an [`OpenChannelWireRequest`] into a validated
/// [`OpenChannelRequestPayload`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpenChannelDecodeError {
    /// More than one scheme's root field group was present.
    #[error("request carries fields for more than one channel scheme")]
    AmbiguousScheme,
    /// A commitment variant's root group was only partially present.
    #[error("{0} fields are incomplete")]
    IncompleteFields(&'static str),
    /// `payword_hash_alg` (or the paytree equivalent) was not `"sha256"`.
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedHashAlg(String),
}

impl TryFrom<OpenChannelWireRequest> for OpenChannelRequestPayload {
    type Error = OpenChannelDecodeError;

    fn try_from(wire: OpenChannelWireRequest) -> Result<Self, Self::Error> {
        let common = OpenChannelCommon {
            client_public_key_der_b64: wire.client_public_key_der_b64,
            vendor_public_key_der_b64: wire.vendor_public_key_der_b64,
            amount: wire.amount,
        };

        let payword_present = wire.payword_root_b64.is_some()
            || wire.payword_unit_value.is_some()
            || wire.payword_max_k.is_some();
        let paytree_groups = [
            (
                "paytree",
                ChannelScheme::Paytree,
                wire.paytree_root_b64,
                wire.paytree_unit_value,
                wire.paytree_max_i,
            ),
            (
                "paytree_first_opt",
                ChannelScheme::PaytreeFirstOpt,
                wire.paytree_first_opt_root_b64,
                wire.paytree_first_opt_unit_value,
                wire.paytree_first_opt_max_i,
            ),
            (
                "paytree_second_opt",
                ChannelScheme::PaytreeSecondOpt,
                wire.paytree_second_opt_root_b64,
                wire.paytree_second_opt_unit_value,
                wire.paytree_second_opt_max_i,
            ),
        ];
        let present_paytree: Vec<_> = paytree_groups
            .into_iter()
            .filter(|(_, _, root, unit, max)| root.is_some() || unit.is_some() || max.is_some())
            .collect();

        if payword_present && !present_paytree.is_empty() {
            return Err(OpenChannelDecodeError::AmbiguousScheme);
        }
        if present_paytree.len() > 1 {
            return Err(OpenChannelDecodeError::AmbiguousScheme);
        }

        if payword_present {
            let root_b64 = wire
                .payword_root_b64
                .ok_or(OpenChannelDecodeError::IncompleteFields("payword"))?;
            let unit_value = wire
                .payword_unit_value
                .ok_or(OpenChannelDecodeError::IncompleteFields("payword"))?;
            let max_k = wire
                .payword_max_k
                .ok_or(OpenChannelDecodeError::IncompleteFields("payword"))?;
            let hash_alg = wire.payword_hash_alg.unwrap_or_default();
            if hash_alg != "sha256" {
                return Err(OpenChannelDecodeError::UnsupportedHashAlg(hash_alg));
            }
            return Ok(Self::Payword {
                common,
                payword: PaywordOpenFields {
                    payword_root_b64: root_b64,
                    payword_unit_value: unit_value,
                    payword_max_k: max_k,
                    payword_hash_alg: hash_alg,
                },
            });
        }

        if let Some((name, scheme, root, unit, max)) = present_paytree.into_iter().next() {
            let root_b64 = root.ok_or(OpenChannelDecodeError::IncompleteFields(name))?;
            let unit_value = unit.ok_or(OpenChannelDecodeError::IncompleteFields(name))?;
            let max_i = max.ok_or(OpenChannelDecodeError::IncompleteFields(name))?;
            return Ok(Self::Paytree {
                common,
                scheme,
                paytree: PaytreeOpenFields {
                    root_b64,
                    unit_value,
                    max_i,
                },
            });
        }

        Ok(Self::Signature(common))
    }
}

/// The wire shape of `POST /issuer/channels*`: a client-signed envelope plus
/// the public key the issuer should verify it against.
///
/// `client_public_key_der_b64` is carried twice on purpose: once here, used
/// to look up the verification key, and once inside the signed payload
/// (via [`OpenChannelWireRequest`]). The issuer rejects the request if the
/// two disagree, which rules out a caller substituting a different key for
/// verification than the one the payload commits to.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OpenChannelEnvelopeRequest {
    /// Base64 DER client public key to verify `envelope` against.
    pub client_public_key_der_b64: String,
    /// The signed envelope; its payload deserializes into an
    /// [`OpenChannelWireRequest`].
    #[serde(flatten)]
    pub envelope: Envelope,
}

/// Response returned after a successful channel open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OpenChannelResponse {
    /// Derived channel identifier.
    pub channel_id: String,
    /// Scheme of the opened channel.
    pub scheme: ChannelScheme,
    /// Locked capacity.
    pub amount: u64,
}

/// Channel metadata as returned by `GET /issuer/channels/{channel_id}` and
/// by the vendor's issuer-lookup fallback. Fields irrelevant to the
/// channel's own scheme are simply absent rather than null, since each
/// scheme gets its own DTO shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChannelSummary {
    /// Derived channel identifier.
    pub channel_id: String,
    /// Scheme of the channel.
    pub scheme: ChannelScheme,
    /// Base64 DER client public key.
    pub client_public_key_der_b64: String,
    /// Base64 DER vendor public key.
    pub vendor_public_key_der_b64: String,
    /// Locked capacity.
    pub amount: u64,
    /// Amount redeemed so far (0 until settled).
    pub balance: u64,
    /// Whether the channel has been settled and closed.
    pub is_closed: bool,
    /// Commitment root, base64, for commitment-based schemes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_b64: Option<String>,
    /// Per-unit value, for commitment-based schemes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_value: Option<u64>,
    /// Largest acceptable counter, for commitment-based schemes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_counter: Option<u64>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 close timestamp, present only once closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<String>,
}

/// `{close_payload_b64, client_close_signature_b64, vendor_close_signature_b64}`
/// used by the signature-variant close/settle flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SignatureCloseRequest {
    /// Base64 canonical JSON of `{channel_id, cumulative_owed_amount}`.
    pub close_payload_b64: PayloadB64,
    /// Client's signature over `close_payload_b64`.
    pub client_close_signature_b64: SignatureB64,
    /// Vendor's signature over the identical bytes.
    pub vendor_close_signature_b64: SignatureB64,
}

/// The decoded close payload carrying the amount the vendor is owed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CloseChannelRequestPayload {
    /// Channel being settled.
    pub channel_id: String,
    /// Cumulative amount the vendor claims, signature-variant settlement.
    pub cumulative_owed_amount: u64,
}

/// Response common to every settlement/close path: the channel id and the
/// two accounts' resulting balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CloseChannelResponse {
    /// Channel that was closed.
    pub channel_id: String,
    /// Client's balance after the refund.
    pub client_balance: u64,
    /// Vendor's balance after the credit.
    pub vendor_balance: u64,
}
