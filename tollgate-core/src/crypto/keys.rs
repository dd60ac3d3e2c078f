//! ECDSA P-256 keys, envelope signing/verification, and base64/DER
//! conversions.
//!
//! Grounded on the RustCrypto `p256` crate's signing API, substituted for
//! `k256`/secp256k1 because this protocol signs over NIST P-256
//! (`SECP256R1`), not the Koblitz curve used by EVM-style signatures.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, EncodePublicKey};
use zeroize::Zeroizing;

use tollgate_proto::envelope::{DerB64, Envelope, PayloadB64, SignatureB64};

/// Errors arising from key loading, signing, or signature verification.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// `payload_b64`/`signature_b64`/a key string was not valid base64.
    #[error("invalid base64 encoding")]
    Base64(#[from] base64::DecodeError),
    /// A DER-encoded key or signature was malformed.
    #[error("invalid DER encoding: {0}")]
    Der(String),
    /// The signature did not verify against the given key and bytes.
    #[error("signature verification failed")]
    InvalidSignature,
    /// A PEM private-key file could not be parsed.
    #[error("invalid PEM private key: {0}")]
    Pem(String),
}

/// An ECDSA P-256 public key, identified on the wire by the base64 of its
/// DER `SubjectPublicKeyInfo` encoding.
#[derive(Clone)]
pub struct PublicKey {
    inner: VerifyingKey,
    der_b64: DerB64,
}

impl PublicKey {
    /// Decodes a public key from its base64 DER `SubjectPublicKeyInfo` form.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if the base64 or DER is malformed.
    pub fn from_der_b64(der_b64: &str) -> Result<Self, KeyError> {
        let der = STANDARD.decode(der_b64)?;
        let inner = VerifyingKey::from_public_key_der(&der)
            .map_err(|e| KeyError::Der(e.to_string()))?;
        Ok(Self {
            inner,
            der_b64: der_b64.to_owned(),
        })
    }

    /// The base64 DER `SubjectPublicKeyInfo` this key was constructed from.
    #[must_use]
    pub fn der_b64(&self) -> &str {
        &self.der_b64
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.der_b64)
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.der_b64 == other.der_b64
    }
}
impl Eq for PublicKey {}

/// An ECDSA P-256 private key, zeroized on drop.
pub struct PrivateKey {
    inner: SigningKey,
}

impl PrivateKey {
    /// Loads a private key from a PKCS8 PEM file.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Pem`] if the file contents are not a valid PEM
    /// encoding of a P-256 private key.
    pub fn from_pem_file(path: &std::path::Path) -> Result<Self, KeyError> {
        let pem = Zeroizing::new(
            std::fs::read_to_string(path).map_err(|e| KeyError::Pem(e.to_string()))?,
        );
        let inner =
            SigningKey::from_pkcs8_pem(&pem).map_err(|e| KeyError::Pem(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Derives this key's public counterpart.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let verifying = VerifyingKey::from(&self.inner);
        let der = verifying
            .to_public_key_der()
            .expect("p256 public key always encodes to DER");
        let der_b64 = STANDARD.encode(der.as_bytes());
        PublicKey {
            inner: verifying,
            der_b64,
        }
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// Signs `bytes` with `key`, returning the base64 DER-encoded signature.
#[must_use]
pub fn sign_bytes(key: &PrivateKey, bytes: &[u8]) -> SignatureB64 {
    let signature: Signature = key.inner.sign(bytes);
    STANDARD.encode(signature.to_der().as_bytes())
}

/// Verifies `signature_b64` (base64 DER ECDSA) over `bytes` under `key`.
///
/// # Errors
///
/// Returns [`KeyError`] if the signature is malformed or does not verify.
pub fn verify_signature_bytes(
    key: &PublicKey,
    bytes: &[u8],
    signature_b64: &str,
) -> Result<(), KeyError> {
    let der = STANDARD.decode(signature_b64)?;
    let signature = Signature::from_der(&der).map_err(|e| KeyError::Der(e.to_string()))?;
    key.inner
        .verify(bytes, &signature)
        .map_err(|_| KeyError::InvalidSignature)
}

/// Builds a signed envelope: base64-encodes `payload_bytes` (already
/// canonical JSON) and signs those exact decoded bytes.
#[must_use]
pub fn generate_envelope(key: &PrivateKey, payload_bytes: &[u8]) -> Envelope {
    let payload_b64: PayloadB64 = STANDARD.encode(payload_bytes);
    let signature_b64 = sign_bytes(key, payload_bytes);
    Envelope::new(payload_b64, signature_b64)
}

/// Decodes `envelope.payload_b64` exactly once, verifies the signature over
/// those bytes, and returns them for the caller to deserialize. Callers
/// must deserialize the returned bytes directly rather than re-encoding the
/// parsed payload — re-encoding can silently produce different bytes than
/// what was signed and make a valid signature appear to fail, or vice versa.
///
/// # Errors
///
/// Returns [`KeyError`] if the payload is not valid base64 or the signature
/// does not verify.
pub fn verify_envelope_and_get_payload_bytes(
    key: &PublicKey,
    envelope: &Envelope,
) -> Result<Vec<u8>, KeyError> {
    let payload_bytes = STANDARD.decode(&envelope.payload_b64)?;
    verify_signature_bytes(key, &payload_bytes, &envelope.signature_b64)?;
    Ok(payload_bytes)
}

/// Decodes a url-safe-base64-without-padding string, as used for channel
/// ids and commitment secrets/siblings (never for envelope payloads, which
/// use standard base64 per the wire format).
///
/// # Errors
///
/// Returns [`KeyError::Base64`] on malformed input.
pub fn decode_urlsafe(value: &str) -> Result<Vec<u8>, KeyError> {
    Ok(URL_SAFE_NO_PAD.decode(value)?)
}

/// Encodes bytes as url-safe-base64-without-padding.
#[must_use]
pub fn encode_urlsafe(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::pkcs8::EncodePrivateKey;

    fn test_key() -> PrivateKey {
        let inner = SigningKey::random(&mut rand::rngs::OsRng);
        PrivateKey { inner }
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let key = test_key();
        let public = key.public_key();
        let bytes = b"{\"a\":1}";
        let sig = sign_bytes(&key, bytes);
        verify_signature_bytes(&public, bytes, &sig).expect("valid signature verifies");
    }

    #[test]
    fn tampered_bytes_fail_verification() {
        let key = test_key();
        let public = key.public_key();
        let sig = sign_bytes(&key, b"original");
        let result = verify_signature_bytes(&public, b"tampered", &sig);
        assert!(result.is_err());
    }

    #[test]
    fn envelope_round_trips() {
        let key = test_key();
        let public = key.public_key();
        let payload = br#"{"amount":10}"#;
        let envelope = generate_envelope(&key, payload);
        let decoded =
            verify_envelope_and_get_payload_bytes(&public, &envelope).expect("verifies");
        assert_eq!(decoded, payload);
    }

    #[test]
    fn public_key_der_round_trips() {
        let key = test_key();
        let public = key.public_key();
        let reparsed = PublicKey::from_der_b64(public.der_b64()).expect("parses");
        assert_eq!(reparsed, public);
    }

    #[test]
    fn private_key_pem_round_trips_through_public_key() {
        let key = test_key();
        let pem = key
            .inner
            .to_pkcs8_pem(p256::pkcs8::LineEnding::LF)
            .expect("encodes");
        let path = std::env::temp_dir().join("tollgate-test-key.pem");
        std::fs::write(&path, pem.as_bytes()).expect("writes");
        let loaded = PrivateKey::from_pem_file(&path).expect("loads");
        assert_eq!(loaded.public_key(), key.public_key());
        let _ = std::fs::remove_file(&path);
    }
}
