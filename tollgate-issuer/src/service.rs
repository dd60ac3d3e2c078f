//! `IssuerService`: account registry, channel opening, and the settlement
//! paths for all three payment schemes.
//!
//! Every public method here corresponds to one HTTP endpoint in
//! `handlers.rs`. Business logic lives here rather than in the handlers so
//! it can be exercised directly in tests without spinning up an HTTP server.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use tollgate_core::crypto::canonical::canonical_json_bytes;
use tollgate_core::crypto::keys::{verify_envelope_and_get_payload_bytes, verify_signature_bytes, PrivateKey, PublicKey};
use tollgate_core::crypto::payword::{compute_cumulative_owed_amount, hash_bytes, verify_token_against_root, Hash32};
use tollgate_core::crypto::paytree::{compute_owed_amount, hash_leaf, verify_proof};
use tollgate_core::model::{Account, Channel, ChannelCommon};
use tollgate_core::{CoreError, Timestamp};
use tollgate_proto::channel::{
    ChannelScheme, ChannelSummary, CloseChannelRequestPayload, CloseChannelResponse,
    OpenChannelEnvelopeRequest, OpenChannelRequestPayload, OpenChannelResponse,
    OpenChannelWireRequest, SignatureCloseRequest,
};
use tollgate_proto::payment::{PayTreeProof, PaytreeSettleRequest, PaywordPayment, PaywordSettleRequest};
use tollgate_storage::{ChannelStatus, CreateChannelResult, KvStore};

use crate::error::IssuerError;

/// Issuer business logic, parameterized over the atomic store backing it.
pub struct IssuerService {
    store: Arc<dyn KvStore>,
    issuer_key: PrivateKey,
}

impl IssuerService {
    /// Builds a service over `store`, signing nothing with `issuer_key` but
    /// publishing its public half at `GET /issuer/keys/public`.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, issuer_key: PrivateKey) -> Self {
        Self { store, issuer_key }
    }

    /// Base64 DER of the issuer's own public key.
    #[must_use]
    pub fn public_key_der_b64(&self) -> String {
        self.issuer_key.public_key().der_b64().to_owned()
    }

    /// Registers a fresh account with the fixed initial balance, or returns
    /// the existing account unchanged if one is already registered at this
    /// key. Registration is idempotent and carries no signature: the
    /// protocol has no notion of proving key ownership at registration time,
    /// only at spend time.
    pub async fn register_account(&self, public_key_der_b64: String) -> Account {
        if let Some(existing) = self.store.get_account(&public_key_der_b64).await {
            return existing;
        }
        let account = Account::new(public_key_der_b64);
        self.store.put_account(account.clone()).await;
        account
    }

    /// Looks up an account by public key.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError`] if no account is registered at this key.
    pub async fn get_account(&self, public_key_der_b64: &str) -> Result<Account, IssuerError> {
        self.store
            .get_account(public_key_der_b64)
            .await
            .ok_or_else(|| CoreError::AccountNotFound(public_key_der_b64.to_owned()).into())
    }

    /// Opens a channel of whichever scheme the signed payload declares.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError`] if the envelope signature is invalid, the
    /// outer key does not match the signed payload's, either account is
    /// unregistered, the amount is non-positive or exceeds the client's
    /// balance, or (for commitment schemes) the commitment window would
    /// exceed the locked amount.
    pub async fn open_channel(
        &self,
        request: OpenChannelEnvelopeRequest,
    ) -> Result<OpenChannelResponse, IssuerError> {
        let client_key = PublicKey::from_der_b64(&request.client_public_key_der_b64).map_err(CoreError::from)?;
        let payload_bytes =
            verify_envelope_and_get_payload_bytes(&client_key, &request.envelope).map_err(CoreError::from)?;
        let wire: OpenChannelWireRequest = serde_json::from_slice(&payload_bytes)?;
        let payload = OpenChannelRequestPayload::try_from(wire)?;
        let common = payload.common();

        if common.client_public_key_der_b64 != request.client_public_key_der_b64 {
            return Err(CoreError::InvalidSignature(
                "client_public_key_der_b64 field does not match the signed payload".to_owned(),
            )
            .into());
        }

        if common.amount == 0 {
            return Err(CoreError::CapacityExceeded("amount must be positive".to_owned()).into());
        }

        let client_account = self
            .store
            .get_account(&common.client_public_key_der_b64)
            .await
            .ok_or_else(|| CoreError::AccountNotFound(common.client_public_key_der_b64.clone()))?;
        if self.store.get_account(&common.vendor_public_key_der_b64).await.is_none() {
            return Err(CoreError::AccountNotFound(common.vendor_public_key_der_b64.clone()).into());
        }
        if client_account.balance < common.amount {
            return Err(CoreError::InsufficientBalance {
                requested: common.amount,
                available: client_account.balance,
            }
            .into());
        }

        let mut salt = [0u8; 32];
        OsRng.fill_bytes(&mut salt);
        let salt_b64 = STANDARD.encode(salt);
        let channel_id = derive_channel_id(
            &common.client_public_key_der_b64,
            &common.vendor_public_key_der_b64,
            &salt_b64,
        )?;

        let channel_common = ChannelCommon {
            channel_id: channel_id.clone(),
            client_public_key_der_b64: common.client_public_key_der_b64.clone(),
            vendor_public_key_der_b64: common.vendor_public_key_der_b64.clone(),
            salt_b64,
            amount: common.amount,
            balance: 0,
            is_closed: false,
            created_at: Timestamp::now(),
            closed_at: None,
        };

        let channel = match &payload {
            OpenChannelRequestPayload::Signature(_) => Channel::Signature(channel_common),
            OpenChannelRequestPayload::Payword { payword, .. } => {
                let root = decode_commitment_root(&payword.payword_root_b64)?;
                let max_owed = payword.payword_max_k.saturating_mul(payword.payword_unit_value);
                if max_owed > common.amount {
                    return Err(CoreError::CapacityExceeded(
                        "payword_max_k * payword_unit_value exceeds amount".to_owned(),
                    )
                    .into());
                }
                Channel::Payword {
                    common: channel_common,
                    root,
                    unit_value: payword.payword_unit_value,
                    max_k: payword.payword_max_k,
                }
            }
            OpenChannelRequestPayload::Paytree { scheme, paytree, .. } => {
                let root = decode_commitment_root(&paytree.root_b64)?;
                let max_owed = paytree.max_i.saturating_mul(paytree.unit_value);
                if max_owed > common.amount {
                    return Err(CoreError::CapacityExceeded("max_i * unit_value exceeds amount".to_owned()).into());
                }
                Channel::Paytree {
                    common: channel_common,
                    variant: *scheme,
                    root,
                    unit_value: paytree.unit_value,
                    max_i: paytree.max_i,
                }
            }
        };

        if self.store.create_channel_exclusive(channel).await == CreateChannelResult::AlreadyExists {
            return Err(CoreError::ChannelAlreadyOpen(channel_id).into());
        }

        let amount_i64 =
            i64::try_from(common.amount).map_err(|_| CoreError::InvariantViolation("amount overflow".to_owned()))?;
        if self
            .store
            .adjust_balance(&common.client_public_key_der_b64, -amount_i64)
            .await
            .is_none()
        {
            self.store.delete_channel(&channel_id).await;
            let available = self
                .store
                .get_account(&common.client_public_key_der_b64)
                .await
                .map_or(0, |account| account.balance);
            return Err(CoreError::InsufficientBalance {
                requested: common.amount,
                available,
            }
            .into());
        }

        Ok(OpenChannelResponse {
            channel_id,
            scheme: payload.scheme(),
            amount: common.amount,
        })
    }

    /// Looks up a channel's current metadata.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError`] if no channel exists at this id.
    pub async fn get_channel(&self, channel_id: &str) -> Result<ChannelSummary, IssuerError> {
        let channel = self
            .store
            .get_channel(channel_id)
            .await
            .ok_or_else(|| CoreError::ChannelNotFound(channel_id.to_owned()))?;
        Ok(channel_to_summary(&channel))
    }

    /// Lists channel summaries, most recently opened first.
    pub async fn list_channels(&self, status: ChannelStatus, before: Option<u64>, limit: usize) -> Vec<ChannelSummary> {
        let ids = self.store.list_channel_ids(status, before, limit).await;
        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(channel) = self.store.get_channel(&id).await {
                summaries.push(channel_to_summary(&channel));
            }
        }
        summaries
    }

    /// Closes a signature-variant channel: the client and vendor jointly
    /// attest to the final cumulative amount owed, each signing the same
    /// payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError`] if the channel doesn't exist, is already
    /// closed, is not a signature channel, either signature fails to
    /// verify, or the claimed amount exceeds the locked capacity.
    pub async fn close_channel_signature(
        &self,
        channel_id: &str,
        request: SignatureCloseRequest,
    ) -> Result<CloseChannelResponse, IssuerError> {
        let payload_bytes = STANDARD.decode(&request.close_payload_b64)?;
        let close_payload: CloseChannelRequestPayload = serde_json::from_slice(&payload_bytes)?;
        if close_payload.channel_id != channel_id {
            return Err(
                CoreError::InvalidSignature("close payload channel id does not match the path".to_owned()).into(),
            );
        }

        let channel = self
            .store
            .get_channel(channel_id)
            .await
            .ok_or_else(|| CoreError::ChannelNotFound(channel_id.to_owned()))?;
        let common = channel.common();
        if common.is_closed {
            return Err(CoreError::ChannelClosed(channel_id.to_owned()).into());
        }
        if !matches!(channel, Channel::Signature(_)) {
            return Err(CoreError::ModeMismatch.into());
        }
        if close_payload.cumulative_owed_amount > common.amount {
            return Err(CoreError::CapacityExceeded("owed amount exceeds locked capacity".to_owned()).into());
        }

        let client_key = PublicKey::from_der_b64(&common.client_public_key_der_b64).map_err(CoreError::from)?;
        verify_signature_bytes(&client_key, &payload_bytes, &request.client_close_signature_b64)
            .map_err(CoreError::from)?;
        let vendor_key = PublicKey::from_der_b64(&common.vendor_public_key_der_b64).map_err(CoreError::from)?;
        verify_signature_bytes(&vendor_key, &payload_bytes, &request.vendor_close_signature_b64)
            .map_err(CoreError::from)?;

        let client_key_b64 = common.client_public_key_der_b64.clone();
        let vendor_key_b64 = common.vendor_public_key_der_b64.clone();
        let amount = common.amount;
        self.finalize_close(
            channel_id,
            &client_key_b64,
            &vendor_key_b64,
            amount,
            close_payload.cumulative_owed_amount,
        )
        .await
    }

    /// Settles a `PayWord` channel against the vendor's final accepted
    /// `(k, token)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError`] if the channel doesn't exist, is already
    /// closed, is not a `PayWord` channel, the vendor key doesn't match, `k`
    /// exceeds the commitment window, the vendor signature fails to verify,
    /// or the token does not hash to the channel's root at `k`.
    pub async fn settle_payword(
        &self,
        channel_id: &str,
        request: PaywordSettleRequest,
    ) -> Result<CloseChannelResponse, IssuerError> {
        let channel = self
            .store
            .get_channel(channel_id)
            .await
            .ok_or_else(|| CoreError::ChannelNotFound(channel_id.to_owned()))?;
        let common = channel.common();
        if common.is_closed {
            return Err(CoreError::ChannelClosed(channel_id.to_owned()).into());
        }
        let Channel::Payword { root, unit_value, max_k, .. } = &channel else {
            return Err(CoreError::ModeMismatch.into());
        };
        if common.vendor_public_key_der_b64 != request.vendor_public_key_der_b64 {
            return Err(CoreError::VendorMismatch.into());
        }
        if request.k > *max_k {
            return Err(CoreError::CapacityExceeded(format!("k={} exceeds max_k={max_k}", request.k)).into());
        }

        let settlement_payload = PaywordPayment {
            channel_id: channel_id.to_owned(),
            k: request.k,
            token_b64: request.token_b64.clone(),
        };
        let payload_bytes = canonical_json_bytes(&settlement_payload)
            .map_err(|e| CoreError::InvariantViolation(e.to_string()))?;
        let vendor_key = PublicKey::from_der_b64(&common.vendor_public_key_der_b64).map_err(CoreError::from)?;
        verify_signature_bytes(&vendor_key, &payload_bytes, &request.vendor_signature_b64).map_err(CoreError::from)?;

        let token = decode_commitment_root(&request.token_b64)?;
        if !verify_token_against_root(&token, request.k, root) {
            return Err(CoreError::InvalidSignature("payword token does not verify against the root".to_owned()).into());
        }

        let owed = compute_cumulative_owed_amount(request.k, *unit_value);
        if owed > common.amount {
            return Err(CoreError::CapacityExceeded("owed amount exceeds locked capacity".to_owned()).into());
        }

        let client_key_b64 = common.client_public_key_der_b64.clone();
        let vendor_key_b64 = common.vendor_public_key_der_b64.clone();
        let amount = common.amount;
        self.finalize_close(channel_id, &client_key_b64, &vendor_key_b64, amount, owed).await
    }

    /// Settles a `PayTree` channel (any pruning variant) against the
    /// vendor's final accepted leaf, full unpruned sibling list, and
    /// signature. The pruning variant only ever affects how the vendor
    /// verifies streamed payments; settlement always carries the complete
    /// proof.
    ///
    /// # Errors
    ///
    /// Returns [`IssuerError`] if the channel doesn't exist, is already
    /// closed, is not a `PayTree` channel, the vendor key doesn't match, `i`
    /// exceeds the commitment window, the vendor signature fails to verify,
    /// or the proof does not recompute the channel's root.
    pub async fn settle_paytree(
        &self,
        channel_id: &str,
        request: PaytreeSettleRequest,
    ) -> Result<CloseChannelResponse, IssuerError> {
        let channel = self
            .store
            .get_channel(channel_id)
            .await
            .ok_or_else(|| CoreError::ChannelNotFound(channel_id.to_owned()))?;
        let common = channel.common();
        if common.is_closed {
            return Err(CoreError::ChannelClosed(channel_id.to_owned()).into());
        }
        let Channel::Paytree { root, unit_value, max_i, .. } = &channel else {
            return Err(CoreError::ModeMismatch.into());
        };
        if common.vendor_public_key_der_b64 != request.vendor_public_key_der_b64 {
            return Err(CoreError::VendorMismatch.into());
        }
        if request.i > *max_i {
            return Err(CoreError::CapacityExceeded(format!("i={} exceeds max_i={max_i}", request.i)).into());
        }

        let settlement_payload = PayTreeProof {
            channel_id: channel_id.to_owned(),
            i: request.i,
            leaf_b64: request.leaf_b64.clone(),
            siblings_b64: request.siblings_b64.clone(),
        };
        let payload_bytes = canonical_json_bytes(&settlement_payload)
            .map_err(|e| CoreError::InvariantViolation(e.to_string()))?;
        let vendor_key = PublicKey::from_der_b64(&common.vendor_public_key_der_b64).map_err(CoreError::from)?;
        verify_signature_bytes(&vendor_key, &payload_bytes, &request.vendor_signature_b64).map_err(CoreError::from)?;

        let leaf_secret = STANDARD.decode(&request.leaf_b64)?;
        let leaf = hash_leaf(&leaf_secret);
        let mut siblings: Vec<Hash32> = Vec::with_capacity(request.siblings_b64.len());
        for sibling_b64 in &request.siblings_b64 {
            siblings.push(decode_commitment_root(sibling_b64)?);
        }
        let depth =
            u32::try_from(siblings.len()).map_err(|_| CoreError::InvariantViolation("proof too deep".to_owned()))?;
        if !verify_proof(root, &leaf, &siblings, request.i, depth) {
            return Err(CoreError::InvalidProof.into());
        }

        let owed = compute_owed_amount(request.i, *unit_value);
        if owed > common.amount {
            return Err(CoreError::CapacityExceeded("owed amount exceeds locked capacity".to_owned()).into());
        }

        let client_key_b64 = common.client_public_key_der_b64.clone();
        let vendor_key_b64 = common.vendor_public_key_der_b64.clone();
        let amount = common.amount;
        self.finalize_close(channel_id, &client_key_b64, &vendor_key_b64, amount, owed).await
    }

    /// Shared close/settle discipline: credit the vendor, refund the
    /// client's remainder, then mark the channel closed, rolling back each
    /// balance change if a later step fails. A failed rollback after the
    /// final step is a fatal, unretried invariant violation: the caller
    /// already promised the vendor its funds and we can no longer honor that
    /// promise or safely undo it.
    async fn finalize_close(
        &self,
        channel_id: &str,
        client_key: &str,
        vendor_key: &str,
        locked_amount: u64,
        owed_amount: u64,
    ) -> Result<CloseChannelResponse, IssuerError> {
        let remainder = locked_amount - owed_amount;
        let owed_i64 =
            i64::try_from(owed_amount).map_err(|_| CoreError::InvariantViolation("owed amount overflow".to_owned()))?;
        let remainder_i64 =
            i64::try_from(remainder).map_err(|_| CoreError::InvariantViolation("remainder overflow".to_owned()))?;

        if self.store.get_account(vendor_key).await.is_none() {
            self.store
                .put_account(Account {
                    public_key_der_b64: vendor_key.to_owned(),
                    balance: 0,
                })
                .await;
        }

        let vendor_balance = self
            .store
            .adjust_balance(vendor_key, owed_i64)
            .await
            .ok_or_else(|| CoreError::InvariantViolation("vendor credit failed".to_owned()))?;

        let client_balance = match self.store.adjust_balance(client_key, remainder_i64).await {
            Some(balance) => balance,
            None => {
                self.store.adjust_balance(vendor_key, -owed_i64).await;
                return Err(CoreError::InvariantViolation("client refund failed after vendor credit".to_owned()).into());
            }
        };

        let closed_at = Timestamp::now().as_secs();
        if !self.store.close_channel(channel_id, owed_amount, closed_at).await {
            let vendor_rolled_back = self.store.adjust_balance(vendor_key, -owed_i64).await.is_some();
            let client_rolled_back = self.store.adjust_balance(client_key, -remainder_i64).await.is_some();
            let detail = if vendor_rolled_back && client_rolled_back {
                format!("failed to mark channel {channel_id} closed")
            } else {
                format!("failed to mark channel {channel_id} closed and failed to roll back balances")
            };
            return Err(CoreError::InvariantViolation(detail).into());
        }

        Ok(CloseChannelResponse {
            channel_id: channel_id.to_owned(),
            client_balance,
            vendor_balance,
        })
    }
}

fn decode_commitment_root(value_b64: &str) -> Result<Hash32, IssuerError> {
    let bytes = STANDARD.decode(value_b64)?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| IssuerError::InvalidRootLength(len))
}

/// `SHA-256(client_der || vendor_der || salt)`, hex-encoded for every
/// scheme. The source this was ported from splits encodings (hex for
/// signature channels, url-safe-base64 for payword/paytree); that asymmetry
/// looked unintentional, so it is unified here to hex across the board.
fn derive_channel_id(
    client_public_key_der_b64: &str,
    vendor_public_key_der_b64: &str,
    salt_b64: &str,
) -> Result<String, IssuerError> {
    let client_der = STANDARD.decode(client_public_key_der_b64)?;
    let vendor_der = STANDARD.decode(vendor_public_key_der_b64)?;
    let salt = STANDARD.decode(salt_b64)?;

    let mut preimage = Vec::with_capacity(client_der.len() + vendor_der.len() + salt.len());
    preimage.extend_from_slice(&client_der);
    preimage.extend_from_slice(&vendor_der);
    preimage.extend_from_slice(&salt);
    let digest = hash_bytes(&preimage);

    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        out.push(DIGITS[usize::from(byte >> 4)] as char);
        out.push(DIGITS[usize::from(byte & 0x0f)] as char);
    }
    out
}

fn channel_to_summary(channel: &Channel) -> ChannelSummary {
    let common = channel.common();
    let (root_b64, unit_value, max_counter) = match channel {
        Channel::Signature(_) => (None, None, None),
        Channel::Payword { root, unit_value, max_k, .. } => (Some(STANDARD.encode(root)), Some(*unit_value), Some(*max_k)),
        Channel::Paytree { root, unit_value, max_i, .. } => (Some(STANDARD.encode(root)), Some(*unit_value), Some(*max_i)),
    };
    ChannelSummary {
        channel_id: common.channel_id.clone(),
        scheme: channel.scheme(),
        client_public_key_der_b64: common.client_public_key_der_b64.clone(),
        vendor_public_key_der_b64: common.vendor_public_key_der_b64.clone(),
        amount: common.amount,
        balance: common.balance,
        is_closed: common.is_closed,
        root_b64,
        unit_value,
        max_counter,
        created_at: common.created_at.to_rfc3339(),
        closed_at: common.closed_at.map(Timestamp::to_rfc3339),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::crypto::keys::{generate_envelope, sign_bytes};
    use tollgate_core::model::INITIAL_BALANCE;
    use tollgate_proto::channel::OpenChannelCommon;
    use tollgate_storage::memory::InMemoryStore;

    fn issuer_key() -> PrivateKey {
        use p256::ecdsa::SigningKey;
        use p256::pkcs8::EncodePrivateKey;
        let signing = SigningKey::random(&mut OsRng);
        let pem = signing.to_pkcs8_pem(p256::pkcs8::LineEnding::LF).expect("encodes");
        let mut suffix = [0u8; 8];
        OsRng.fill_bytes(&mut suffix);
        let path = std::env::temp_dir().join(format!("tollgate-issuer-test-{}.pem", hex_encode(&suffix)));
        std::fs::write(&path, pem.as_bytes()).expect("writes");
        let key = PrivateKey::from_pem_file(&path).expect("loads");
        let _ = std::fs::remove_file(&path);
        key
    }

    fn client_key() -> PrivateKey {
        issuer_key()
    }

    async fn service_with_accounts() -> (IssuerService, PrivateKey, PrivateKey) {
        let store = Arc::new(InMemoryStore::new());
        let service = IssuerService::new(store, issuer_key());
        let client = client_key();
        let vendor = client_key();
        service.register_account(client.public_key().der_b64().to_owned()).await;
        service.register_account(vendor.public_key().der_b64().to_owned()).await;
        (service, client, vendor)
    }

    #[tokio::test]
    async fn register_account_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let service = IssuerService::new(store, issuer_key());
        let client = client_key();
        let der = client.public_key().der_b64().to_owned();
        let first = service.register_account(der.clone()).await;
        assert_eq!(first.balance, INITIAL_BALANCE);
        let second = service.register_account(der).await;
        assert_eq!(second.balance, INITIAL_BALANCE);
    }

    #[tokio::test]
    async fn opens_signature_channel_and_debits_client() {
        let (service, client, vendor) = service_with_accounts().await;
        let common = OpenChannelCommon {
            client_public_key_der_b64: client.public_key().der_b64().to_owned(),
            vendor_public_key_der_b64: vendor.public_key().der_b64().to_owned(),
            amount: 5_000,
        };
        let payload_bytes = canonical_json_bytes(&common).expect("encodes");
        let envelope = generate_envelope(&client, &payload_bytes);
        let request = OpenChannelEnvelopeRequest {
            client_public_key_der_b64: common.client_public_key_der_b64.clone(),
            envelope,
        };

        let response = service.open_channel(request).await.expect("opens");
        assert_eq!(response.scheme, ChannelScheme::Signature);
        assert_eq!(response.amount, 5_000);

        let account = service.get_account(&common.client_public_key_der_b64).await.expect("exists");
        assert_eq!(account.balance, INITIAL_BALANCE - 5_000);
    }

    #[tokio::test]
    async fn open_channel_rejects_key_confusion() {
        // `client` signs the envelope (so the outer key checks out), but the
        // signed payload itself names `other` as the spending client. The
        // signature alone can't catch this: only the outer/inner field
        // comparison can.
        let (service, client, vendor) = service_with_accounts().await;
        let other = client_key();
        service.register_account(other.public_key().der_b64().to_owned()).await;
        let common = OpenChannelCommon {
            client_public_key_der_b64: other.public_key().der_b64().to_owned(),
            vendor_public_key_der_b64: vendor.public_key().der_b64().to_owned(),
            amount: 100,
        };
        let payload_bytes = canonical_json_bytes(&common).expect("encodes");
        let envelope = generate_envelope(&client, &payload_bytes);
        let request = OpenChannelEnvelopeRequest {
            client_public_key_der_b64: client.public_key().der_b64().to_owned(),
            envelope,
        };

        let err = service.open_channel(request).await.expect_err("key mismatch rejected");
        assert!(matches!(err, IssuerError::Core(CoreError::InvalidSignature(_))));

        let other_account = service
            .get_account(&other.public_key().der_b64().to_owned())
            .await
            .expect("exists");
        assert_eq!(other_account.balance, INITIAL_BALANCE);
    }

    #[tokio::test]
    async fn payword_settlement_closes_channel_and_pays_vendor() {
        let (service, client, vendor) = service_with_accounts().await;

        let seed = [5u8; 32];
        let n = 10u64;
        let chain = tollgate_core::crypto::payword::build_hash_chain(seed, n);
        let root = chain[usize::try_from(n).unwrap()];

        let common = OpenChannelCommon {
            client_public_key_der_b64: client.public_key().der_b64().to_owned(),
            vendor_public_key_der_b64: vendor.public_key().der_b64().to_owned(),
            amount: 1_000,
        };
        let wire = serde_json::json!({
            "client_public_key_der_b64": common.client_public_key_der_b64,
            "vendor_public_key_der_b64": common.vendor_public_key_der_b64,
            "amount": common.amount,
            "payword_root_b64": STANDARD.encode(root),
            "payword_unit_value": 10,
            "payword_max_k": n,
            "payword_hash_alg": "sha256",
        });
        let payload_bytes = serde_json::to_vec(&wire).expect("encodes");
        let envelope = generate_envelope(&client, &payload_bytes);
        let request = OpenChannelEnvelopeRequest {
            client_public_key_der_b64: common.client_public_key_der_b64.clone(),
            envelope,
        };
        let opened = service.open_channel(request).await.expect("opens payword channel");

        let k = 4u64;
        let token = chain[usize::try_from(n - k).unwrap()];
        let settlement_payload = PaywordPayment {
            channel_id: opened.channel_id.clone(),
            k,
            token_b64: STANDARD.encode(token),
        };
        let payload_bytes = canonical_json_bytes(&settlement_payload).expect("encodes");
        let vendor_signature = sign_bytes(&vendor, &payload_bytes);

        let settle_request = PaywordSettleRequest {
            vendor_public_key_der_b64: vendor.public_key().der_b64().to_owned(),
            k,
            token_b64: STANDARD.encode(token),
            vendor_signature_b64: vendor_signature,
        };

        let response = service
            .settle_payword(&opened.channel_id, settle_request)
            .await
            .expect("settles");
        assert_eq!(response.vendor_balance, INITIAL_BALANCE + 40);
        assert_eq!(response.client_balance, INITIAL_BALANCE - 1_000 + (1_000 - 40));

        let summary = service.get_channel(&opened.channel_id).await.expect("exists");
        assert!(summary.is_closed);
    }

    #[tokio::test]
    async fn settling_already_closed_channel_fails() {
        let (service, client, vendor) = service_with_accounts().await;
        let common = OpenChannelCommon {
            client_public_key_der_b64: client.public_key().der_b64().to_owned(),
            vendor_public_key_der_b64: vendor.public_key().der_b64().to_owned(),
            amount: 100,
        };
        let payload_bytes = canonical_json_bytes(&common).expect("encodes");
        let envelope = generate_envelope(&client, &payload_bytes);
        let request = OpenChannelEnvelopeRequest {
            client_public_key_der_b64: common.client_public_key_der_b64.clone(),
            envelope,
        };
        let opened = service.open_channel(request).await.expect("opens");

        let close_payload = CloseChannelRequestPayload {
            channel_id: opened.channel_id.clone(),
            cumulative_owed_amount: 50,
        };
        let payload_bytes = canonical_json_bytes(&close_payload).expect("encodes");
        let close_payload_b64 = STANDARD.encode(&payload_bytes);
        let client_sig = sign_bytes(&client, &payload_bytes);
        let vendor_sig = sign_bytes(&vendor, &payload_bytes);
        let close_request = SignatureCloseRequest {
            close_payload_b64: close_payload_b64.clone(),
            client_close_signature_b64: client_sig.clone(),
            vendor_close_signature_b64: vendor_sig.clone(),
        };
        service
            .close_channel_signature(&opened.channel_id, close_request)
            .await
            .expect("closes once");

        let retry = SignatureCloseRequest {
            close_payload_b64,
            client_close_signature_b64: client_sig,
            vendor_close_signature_b64: vendor_sig,
        };
        let err = service
            .close_channel_signature(&opened.channel_id, retry)
            .await
            .expect_err("already closed");
        assert!(matches!(err, IssuerError::Core(CoreError::ChannelClosed(_))));
    }
}
