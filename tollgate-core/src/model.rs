//! Domain types: accounts, channels, and latest payment state.
//!
//! Variant discrimination is static here (an enum, not a presence check on
//! an optional field), matching the design note in the specification this
//! crate implements: a statically typed port should use tagged-union
//! records rather than the dynamically-typed source's "field present or
//! not" convention.

use std::collections::HashMap;

use tollgate_proto::channel::ChannelScheme;

use crate::crypto::payword::Hash32;
use crate::timestamp::Timestamp;

/// Fixed initial balance credited on first account registration.
pub const INITIAL_BALANCE: u64 = 10_000_000;

/// A balance record, keyed by a participant's public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Base64 DER `SubjectPublicKeyInfo` identifying this account.
    pub public_key_der_b64: String,
    /// Current balance, smallest unit. Never negative.
    pub balance: u64,
}

impl Account {
    /// Creates a freshly registered account with the fixed initial balance.
    #[must_use]
    pub const fn new(public_key_der_b64: String) -> Self {
        Self {
            public_key_der_b64,
            balance: INITIAL_BALANCE,
        }
    }
}

/// Fields common to every channel variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCommon {
    /// `SHA-256(client_pub_der || vendor_pub_der || salt)`, derived not chosen.
    pub channel_id: String,
    /// Base64 DER client public key.
    pub client_public_key_der_b64: String,
    /// Base64 DER vendor public key.
    pub vendor_public_key_der_b64: String,
    /// 32 random bytes, base64, mixed into the channel id derivation.
    pub salt_b64: String,
    /// Locked capacity; positive.
    pub amount: u64,
    /// Amount redeemed so far; starts at 0, only ever set once at close.
    pub balance: u64,
    /// Whether the channel has been settled and closed.
    pub is_closed: bool,
    /// Channel open time.
    pub created_at: Timestamp,
    /// Channel close time, set exactly once.
    pub closed_at: Option<Timestamp>,
}

/// A channel record, tagged by payment scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    /// Plain ECDSA monotonic-counter channel; no extra fields.
    Signature(ChannelCommon),
    /// `PayWord` hash-chain channel.
    Payword {
        /// Shared channel fields.
        common: ChannelCommon,
        /// Chain terminal hash, the commitment.
        root: Hash32,
        /// Value of one chain step.
        unit_value: u64,
        /// Chain length; `max_k * unit_value <= amount`.
        max_k: u64,
    },
    /// `PayTree` Merkle channel, any of the three pruning subtypes.
    Paytree {
        /// Shared channel fields.
        common: ChannelCommon,
        /// Which `PayTree` subtype (plain / first-opt / second-opt).
        variant: ChannelScheme,
        /// Merkle root, the commitment.
        root: Hash32,
        /// Value of one leaf.
        unit_value: u64,
        /// Largest leaf index; `max_i * unit_value <= amount`.
        max_i: u64,
    },
}

impl Channel {
    /// Borrows the fields common to every variant.
    #[must_use]
    pub const fn common(&self) -> &ChannelCommon {
        match self {
            Self::Signature(common) | Self::Payword { common, .. } | Self::Paytree { common, .. } => common,
        }
    }

    /// Mutably borrows the fields common to every variant.
    pub fn common_mut(&mut self) -> &mut ChannelCommon {
        match self {
            Self::Signature(common) | Self::Payword { common, .. } | Self::Paytree { common, .. } => common,
        }
    }

    /// The scheme this channel was opened with.
    #[must_use]
    pub const fn scheme(&self) -> ChannelScheme {
        match self {
            Self::Signature(_) => ChannelScheme::Signature,
            Self::Payword { .. } => ChannelScheme::Payword,
            Self::Paytree { variant, .. } => *variant,
        }
    }
}

/// The latest accepted payment for a channel, kept in a key separate from
/// the channel record so that streaming payments don't rewrite channel
/// metadata on every step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentState {
    /// Signature-variant state: strictly monotonic in `cumulative_owed_amount`.
    Signature {
        /// Accepted cumulative amount.
        cumulative_owed_amount: u64,
        /// The client's envelope payload, base64, for idempotency checks.
        payload_b64: String,
        /// The client's signature, base64, for idempotency checks.
        signature_b64: String,
        /// Acceptance time.
        created_at: Timestamp,
    },
    /// `PayWord`-variant state: strictly monotonic in `k`.
    Payword {
        /// Accepted chain counter.
        k: u64,
        /// Accepted token (preimage).
        token: Hash32,
        /// Acceptance time.
        created_at: Timestamp,
    },
    /// `PayTree`-variant state: strictly monotonic in `i`.
    Paytree {
        /// Accepted leaf index.
        i: u64,
        /// Accepted leaf secret, base64 (not its hash: settlement and
        /// idempotent receipts both need the preimage, and the issuer places
        /// no length constraint on it).
        leaf_secret_b64: String,
        /// Full, unpruned sibling list accepted for this index.
        siblings: Vec<Hash32>,
        /// Interior-node cache, second-opt channels only.
        node_cache: Option<HashMap<String, Hash32>>,
        /// Acceptance time.
        created_at: Timestamp,
    },
}

impl PaymentState {
    /// The ordering key used for monotonicity comparisons: the cumulative
    /// amount, the chain counter, or the leaf index, depending on variant.
    #[must_use]
    pub const fn ordering_key(&self) -> u64 {
        match self {
            Self::Signature {
                cumulative_owed_amount,
                ..
            } => *cumulative_owed_amount,
            Self::Payword { k, .. } => *k,
            Self::Paytree { i, .. } => *i,
        }
    }
}
