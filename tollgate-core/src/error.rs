//! Core-level errors: the outcomes of crypto verification and domain
//! invariant checks, independent of how they are later surfaced over HTTP.

use tollgate_proto::error::{AsPaymentProblem, ErrorReason, PaymentProblem};

/// Errors raised by crypto verification and channel-invariant checks shared
/// across the issuer and vendor services.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A signature failed to verify.
    #[error("signature verification failed: {0}")]
    InvalidSignature(String),
    /// Same counter resubmitted with different payload/signature bytes.
    #[error("payment replay detected for the same counter")]
    Replay,
    /// Counter did not strictly increase over the stored state.
    #[error("counter did not strictly increase: new={new} stored={stored}")]
    NonMonotonic {
        /// Counter submitted.
        new: u64,
        /// Counter currently stored.
        stored: u64,
    },
    /// Amount or counter would exceed the channel's capacity or window.
    #[error("{0}")]
    CapacityExceeded(String),
    /// Client balance is insufficient to open the requested channel.
    #[error("insufficient balance: requested={requested} available={available}")]
    InsufficientBalance {
        /// Amount requested.
        requested: u64,
        /// Amount available.
        available: u64,
    },
    /// Referenced channel does not exist.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),
    /// Referenced account (client or vendor) is not registered.
    #[error("account not registered: {0}")]
    AccountNotFound(String),
    /// An open channel already exists for this identity triple.
    #[error("channel already open: {0}")]
    ChannelAlreadyOpen(String),
    /// Channel has already been settled and closed.
    #[error("channel already closed: {0}")]
    ChannelClosed(String),
    /// Channel is not owned by the vendor processing the request.
    #[error("channel is not owned by this vendor")]
    VendorMismatch,
    /// Channel is not the expected commitment scheme.
    #[error("channel is not the expected scheme")]
    ModeMismatch,
    /// A `PayTree` proof had the wrong number of sibling hashes.
    #[error("proof has an invalid sibling list")]
    InvalidProof,
    /// The issuer was unreachable or returned a transport-level error.
    #[error("upstream issuer unavailable: {0}")]
    UpstreamUnavailable(String),
    /// A code-2 reply from the atomic store after reconciliation, or a
    /// rollback that itself failed. Always fatal; never retried.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl AsPaymentProblem for CoreError {
    fn as_payment_problem(&self) -> PaymentProblem {
        let reason = match self {
            Self::InvalidSignature(_) => ErrorReason::InvalidSignature,
            Self::Replay => ErrorReason::Replay,
            Self::NonMonotonic { .. } => ErrorReason::NonMonotonic,
            Self::CapacityExceeded(_) => ErrorReason::CapacityExceeded,
            Self::InsufficientBalance { .. } => ErrorReason::InsufficientBalance,
            Self::ChannelNotFound(_) => ErrorReason::ChannelNotFound,
            Self::AccountNotFound(_) => ErrorReason::AccountNotFound,
            Self::ChannelAlreadyOpen(_) => ErrorReason::ChannelAlreadyOpen,
            Self::ChannelClosed(_) => ErrorReason::ChannelClosed,
            Self::VendorMismatch => ErrorReason::VendorMismatch,
            Self::ModeMismatch => ErrorReason::ModeMismatch,
            Self::InvalidProof => ErrorReason::InvalidProof,
            Self::UpstreamUnavailable(_) => ErrorReason::UpstreamUnavailable,
            Self::InvariantViolation(_) => ErrorReason::InvariantViolation,
        };
        PaymentProblem::new(reason, self.to_string())
    }
}

impl From<crate::crypto::keys::KeyError> for CoreError {
    fn from(value: crate::crypto::keys::KeyError) -> Self {
        Self::InvalidSignature(value.to_string())
    }
}
