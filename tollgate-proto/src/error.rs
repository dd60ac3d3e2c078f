//! Machine-readable error reason codes shared by every HTTP-facing error
//! type in the workspace.

use serde::{Deserialize, Serialize};

/// Machine-readable error reason codes returned alongside a human-readable
/// message in every error response.
///
/// These are the error *kinds* named by the specification this crate
/// implements, not Rust type names: each crate's own `thiserror` enum maps
/// its variants onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorReason {
    /// A signature failed to verify.
    InvalidSignature,
    /// Same counter resubmitted with different payload/signature bytes.
    Replay,
    /// Counter did not strictly increase.
    NonMonotonic,
    /// Amount or counter would exceed the channel's locked capacity or window.
    CapacityExceeded,
    /// Client balance is insufficient to open the requested channel.
    InsufficientBalance,
    /// Referenced channel does not exist.
    ChannelNotFound,
    /// Referenced account (client or vendor) is not registered.
    AccountNotFound,
    /// The request body was malformed, ambiguous, or otherwise failed
    /// input validation before any domain check ran.
    InvalidRequest,
    /// An open channel already exists for this identity triple.
    ChannelAlreadyOpen,
    /// Channel has already been settled and closed.
    ChannelClosed,
    /// Channel is not owned by the vendor processing the request.
    VendorMismatch,
    /// Channel is not the expected commitment scheme.
    ModeMismatch,
    /// A `PayTree` proof had the wrong number of sibling hashes.
    InvalidProof,
    /// The issuer was unreachable or returned a transport-level error.
    UpstreamUnavailable,
    /// A code-2 reply from the atomic store after reconciliation, or a
    /// rollback that itself failed. Always fatal.
    InvariantViolation,
    /// Catch-all for failures with no more specific reason.
    UnexpectedError,
}

impl ErrorReason {
    /// The `snake_case` wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidSignature => "invalid_signature",
            Self::Replay => "replay",
            Self::NonMonotonic => "non_monotonic",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::InsufficientBalance => "insufficient_balance",
            Self::ChannelNotFound => "channel_not_found",
            Self::AccountNotFound => "account_not_found",
            Self::InvalidRequest => "invalid_request",
            Self::ChannelAlreadyOpen => "channel_already_open",
            Self::ChannelClosed => "channel_closed",
            Self::VendorMismatch => "vendor_mismatch",
            Self::ModeMismatch => "mode_mismatch",
            Self::InvalidProof => "invalid_proof",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::InvariantViolation => "invariant_violation",
            Self::UnexpectedError => "unexpected_error",
        }
    }

    /// The HTTP status code every crate's `IntoResponse` mapping should use
    /// for this reason. Kept in one place so the issuer and vendor surfaces
    /// can't drift from each other.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidSignature
            | Self::Replay
            | Self::NonMonotonic
            | Self::CapacityExceeded
            | Self::InsufficientBalance
            | Self::ChannelAlreadyOpen
            | Self::ChannelClosed
            | Self::VendorMismatch
            | Self::ModeMismatch
            | Self::InvalidProof
            | Self::InvalidRequest => 400,
            Self::ChannelNotFound | Self::AccountNotFound => 404,
            Self::UpstreamUnavailable => 502,
            Self::InvariantViolation | Self::UnexpectedError => 500,
        }
    }
}

impl core::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for converting an error into a structured, wire-serializable
/// problem description.
pub trait AsPaymentProblem {
    /// Converts `self` into a [`PaymentProblem`].
    fn as_payment_problem(&self) -> PaymentProblem;
}

/// A structured error returned to callers: a machine-readable reason plus a
/// human-readable detail message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProblem {
    /// Machine-readable reason.
    pub reason: ErrorReason,
    /// Human-readable details.
    pub details: String,
}

impl PaymentProblem {
    /// Creates a new problem.
    #[must_use]
    pub const fn new(reason: ErrorReason, details: String) -> Self {
        Self { reason, details }
    }
}
