//! The signed envelope wrapper used for every client- and vendor-originated
//! request that must be authenticated by the issuer.

use serde::{Deserialize, Serialize};

/// A base64-encoded JSON payload.
pub type PayloadB64 = String;

/// A base64-encoded DER signature.
pub type SignatureB64 = String;

/// A base64-encoded DER-encoded key (public or private).
pub type DerB64 = String;

/// A signed payload: the base64 payload bytes plus a detached signature
/// over those exact bytes.
///
/// Verifiers must decode `payload_b64` exactly once and reuse those decoded
/// bytes both for signature verification and for parsing the inner payload.
/// Re-encoding the parsed payload before verifying breaks the signature if
/// the original encoder used a different key order or spacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64-encoded canonical JSON payload bytes.
    pub payload_b64: PayloadB64,
    /// Base64-encoded DER ECDSA signature over the decoded payload bytes.
    pub signature_b64: SignatureB64,
}

impl Envelope {
    /// Wraps an already base64-encoded payload and signature.
    #[must_use]
    pub const fn new(payload_b64: PayloadB64, signature_b64: SignatureB64) -> Self {
        Self {
            payload_b64,
            signature_b64,
        }
    }
}
