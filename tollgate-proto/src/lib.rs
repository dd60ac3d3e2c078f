//! Wire format types for the tollgate off-chain micropayment protocol.
//!
//! This crate defines the serialization-level data structures exchanged
//! between Issuer, Vendor and Client over HTTP. It depends only on `serde`
//! and `serde_json`, so it can be shared by every other crate in the
//! workspace without pulling in crypto or transport dependencies.
//!
//! # Modules
//!
//! - [`envelope`] — the signed envelope wrapper and base64 newtypes
//! - [`channel`] — channel open/close request and response payloads
//! - [`payment`] — per-scheme payment submission payloads
//! - [`error`] — machine-readable error reasons and the structured problem type

pub mod account;
pub mod channel;
pub mod envelope;
pub mod error;
pub mod payment;

pub use account::{AccountResponse, IssuerPublicKeyResponse, RegisterAccountRequest};
pub use channel::{
    ChannelScheme, ChannelSummary, CloseChannelRequestPayload, CloseChannelResponse,
    OpenChannelEnvelopeRequest, OpenChannelRequestPayload, OpenChannelResponse,
};
pub use envelope::{DerB64, Envelope, PayloadB64, SignatureB64};
pub use error::{AsPaymentProblem, ErrorReason, PaymentProblem};
pub use payment::{
    PayTreeProof, PaymentReceipt, PaytreeSettleRequest, PaywordPayment, PaywordSettleRequest,
    SignaturePayment,
};

/// Only hash algorithm accepted by PayWord and PayTree channels.
pub const SHA256_ALG: &str = "sha256";
