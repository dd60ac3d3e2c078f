//! Signature-scheme client helpers: one signed envelope per payment,
//! carrying a strictly increasing cumulative amount.

use tollgate_core::crypto::keys::PrivateKey;
use tollgate_proto::channel::CloseChannelRequestPayload;
use tollgate_proto::envelope::Envelope;
use tollgate_proto::payment::SignaturePayment;

use crate::error::ClientError;
use crate::signing::sign_payload;

/// Builds and signs one streaming payment envelope for the signature
/// scheme.
///
/// # Errors
///
/// Returns [`ClientError::Canonical`] if the payload cannot be encoded.
pub fn build_payment_envelope(
    key: &PrivateKey,
    channel_id: &str,
    cumulative_owed_amount: u64,
) -> Result<Envelope, ClientError> {
    sign_payload(
        key,
        &SignaturePayment {
            channel_id: channel_id.to_owned(),
            cumulative_owed_amount,
        },
    )
}

/// Builds and signs the closure payload a client may optionally
/// co-sign ahead of time; the vendor typically reuses the last accepted
/// payment envelope for this instead (see the vendor's settlement path),
/// but a client that wants to request closure directly against the issuer
/// signs the same payload shape itself.
///
/// # Errors
///
/// Returns [`ClientError::Canonical`] if the payload cannot be encoded.
pub fn build_close_envelope(
    key: &PrivateKey,
    channel_id: &str,
    cumulative_owed_amount: u64,
) -> Result<Envelope, ClientError> {
    sign_payload(
        key,
        &CloseChannelRequestPayload {
            channel_id: channel_id.to_owned(),
            cumulative_owed_amount,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::SigningKey;
    use tollgate_core::crypto::keys::verify_envelope_and_get_payload_bytes;

    fn test_key() -> PrivateKey {
        use p256::pkcs8::EncodePrivateKey;
        let inner = SigningKey::random(&mut rand::rngs::OsRng);
        let pem = inner
            .to_pkcs8_pem(p256::pkcs8::LineEnding::LF)
            .expect("encodes");
        let path = std::env::temp_dir().join("tollgate-client-test-signature-key.pem");
        std::fs::write(&path, pem.as_bytes()).expect("writes");
        let key = PrivateKey::from_pem_file(&path).expect("loads");
        let _ = std::fs::remove_file(&path);
        key
    }

    #[test]
    fn payment_envelope_verifies_and_decodes() {
        let key = test_key();
        let public = key.public_key();
        let envelope = build_payment_envelope(&key, "chan-1", 250).expect("signs");
        let bytes = verify_envelope_and_get_payload_bytes(&public, &envelope).expect("verifies");
        let payload: SignaturePayment = serde_json::from_slice(&bytes).expect("parses");
        assert_eq!(payload.channel_id, "chan-1");
        assert_eq!(payload.cumulative_owed_amount, 250);
    }
}
