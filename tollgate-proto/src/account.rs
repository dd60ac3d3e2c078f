//! Account registration and lookup payloads.

use serde::{Deserialize, Serialize};

/// `POST /issuer/accounts` request body. Registration is idempotent and
/// unauthenticated: any caller may register any public key, matching the
/// reference issuer's "get or create with the fixed initial balance"
/// behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RegisterAccountRequest {
    /// Base64 DER `SubjectPublicKeyInfo` identifying the account.
    pub public_key_der_b64: String,
}

/// An account's public key and balance, returned by registration and lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AccountResponse {
    /// Base64 DER `SubjectPublicKeyInfo` identifying the account.
    pub public_key_der_b64: String,
    /// Current balance, smallest unit.
    pub balance: u64,
}

/// `GET /issuer/keys/public` response: the issuer's own verification key,
/// published so clients and vendors can confirm who minted their balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IssuerPublicKeyResponse {
    /// Base64 DER `SubjectPublicKeyInfo` of the issuer's signing key.
    pub public_key_der_b64: String,
}
