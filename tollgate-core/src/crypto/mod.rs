//! Cryptographic primitives: ECDSA signing/verification over canonical
//! JSON, PayWord hash chains, and PayTree Merkle commitments.

pub mod canonical;
pub mod keys;
pub mod payword;
pub mod paytree;

pub use canonical::{canonical_json_bytes, CanonicalJsonError};
pub use keys::{sign_bytes, verify_signature_bytes, PrivateKey, PublicKey};
