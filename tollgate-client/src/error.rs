//! Client-side error type.
//!
//! HTTP transport errors are owned by [`crate::issuer_client::IssuerClientError`]
//! and [`crate::vendor_client::VendorClientError`] instead of this type,
//! mirroring the vendor's split between its own service errors and its
//! `IssuerClient`'s transport errors.

use tollgate_core::crypto::keys::KeyError;

/// Errors arising from client-side envelope signing or proof generation.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A base64 or signing operation failed.
    #[error("key or signature error: {0}")]
    Key(#[from] KeyError),
    /// `canonical_json_bytes` failed to serialize a payload.
    #[error("failed to encode payload: {0}")]
    Canonical(#[from] tollgate_core::crypto::canonical::CanonicalJsonError),
    /// A `PayWord`/`PayTree` proof was requested for an index outside the
    /// channel's commitment window.
    #[error("index {requested} exceeds channel capacity {max}")]
    IndexOutOfRange {
        /// The requested `k`/`i`.
        requested: u64,
        /// The channel's `max_k`/`max_i`.
        max: u64,
    },
}
