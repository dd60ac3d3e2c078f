//! Envelope signing helpers shared by every payment scheme.

use serde::Serialize;

use tollgate_core::crypto::canonical::canonical_json_bytes;
use tollgate_core::crypto::keys::{generate_envelope, PrivateKey};
use tollgate_proto::envelope::Envelope;

use crate::error::ClientError;

/// Canonicalizes `payload` and signs it under `key`, producing an envelope
/// ready to submit as-is. Signer and verifier must agree on the exact
/// bytes, so the payload is never re-encoded after this point.
///
/// # Errors
///
/// Returns [`ClientError::Canonical`] if `payload` cannot be represented as
/// JSON.
pub fn sign_payload<T: Serialize>(key: &PrivateKey, payload: &T) -> Result<Envelope, ClientError> {
    let bytes = canonical_json_bytes(payload)?;
    Ok(generate_envelope(key, &bytes))
}
