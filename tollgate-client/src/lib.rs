//! Client SDK for the tollgate micropayment protocol.
//!
//! Covers the three payment schemes end to end from the paying side:
//! generating a commitment (a signature key is already external; a
//! `PayWord` hash chain or `PayTree` Merkle tree is generated locally),
//! signing the open-channel request, producing successive payment proofs,
//! and submitting both to a vendor over HTTP with automatic retry.
//!
//! - [`signing`] — shared envelope-signing helper.
//! - [`signature`] — signature-scheme payment and close payloads.
//! - [`payword`] — `PayWord` chain generation and token proofs.
//! - [`paytree`] — `PayTree` generation and pruned proofs, all three
//!   subtypes.
//! - [`issuer_client`] — HTTP client for account registration and channel
//!   opening against the issuer.
//! - [`vendor_client`] — HTTP client for payment submission and closure
//!   requests against a vendor, with retry middleware.
//! - [`retry`] — the retry middleware itself.
//! - [`error`] — the unified client error type.

pub mod error;
pub mod issuer_client;
pub mod payword;
pub mod paytree;
pub mod retry;
pub mod signature;
pub mod signing;
pub mod vendor_client;

pub use error::ClientError;
pub use issuer_client::{IssuerClient, IssuerClientError};
pub use vendor_client::{VendorClient, VendorClientError};
