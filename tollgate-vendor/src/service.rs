//! `VendorService`: streaming payment acceptance and settlement for all
//! three payment schemes, plus the channel-metadata cache-miss fallback to
//! the issuer.
//!
//! Every public method here corresponds to one HTTP endpoint in
//! `handlers.rs`, mirroring the split between business logic and transport
//! that the issuer side uses.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use tollgate_core::crypto::canonical::canonical_json_bytes;
use tollgate_core::crypto::keys::{sign_bytes, verify_envelope_and_get_payload_bytes, PrivateKey, PublicKey};
use tollgate_core::crypto::payword::{verify_token_against_root, verify_token_incremental, Hash32};
use tollgate_core::crypto::paytree::{first_opt, hash_leaf, second_opt, tree_depth, verify_proof};
use tollgate_core::model::{Channel, ChannelCommon, PaymentState};
use tollgate_core::{CoreError, Timestamp};
use tollgate_proto::channel::{
    ChannelScheme, ChannelSummary, CloseChannelResponse, SignatureCloseRequest,
};
use tollgate_proto::envelope::Envelope;
use tollgate_proto::payment::{
    PayTreeProof, PaymentReceipt, PaytreeSettleRequest, PaywordPayment, PaywordSettleRequest,
    SignaturePayment,
};
use tollgate_storage::{KvStore, SaveInitialResult, SavePaymentResult};

use crate::error::VendorError;
use crate::issuer_client::IssuerClient;

/// Which atomic `save_*_payment` script a [`VendorService::save_with_retry`]
/// call should use once the channel is known.
#[derive(Debug, Clone, Copy)]
enum PaymentKind {
    Signature,
    Payword,
    Paytree,
}

/// Vendor business logic, parameterized over the local atomic store and the
/// issuer client used on a cache miss and at settlement.
pub struct VendorService {
    store: Arc<dyn KvStore>,
    vendor_key: PrivateKey,
    issuer: IssuerClient,
}

impl VendorService {
    /// Builds a service over `store`, signing settlement submissions and
    /// closure requests with `vendor_key`, reached at the issuer through
    /// `issuer`.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, vendor_key: PrivateKey, issuer: IssuerClient) -> Self {
        Self {
            store,
            vendor_key,
            issuer,
        }
    }

    /// Base64 DER of this vendor's own public key.
    #[must_use]
    pub fn public_key_der_b64(&self) -> String {
        self.vendor_key.public_key().der_b64().to_owned()
    }

    /// Returns the channel's current record, fetching and locally caching it
    /// from the issuer on a cache miss.
    ///
    /// # Errors
    ///
    /// Returns [`VendorError`] if the channel is not owned by this vendor
    /// (whether cached already or freshly fetched), or if the issuer lookup
    /// itself fails.
    async fn get_or_fetch_channel(&self, channel_id: &str) -> Result<Channel, VendorError> {
        if let Some(channel) = self.store.get_channel(channel_id).await {
            return self.verify_ownership(channel);
        }

        let fetched = self.verify_channel_with_issuer(channel_id).await?;
        self.store.create_channel_exclusive(fetched.clone()).await;
        Ok(fetched)
    }

    /// Returns the channel for an incoming payment, plus whether this is the
    /// first payment this vendor instance has ever seen for it.
    ///
    /// Unlike [`Self::get_or_fetch_channel`], a cache miss here does **not**
    /// write the channel record on its own: caching a bare channel record
    /// ahead of its first payment state would itself be a second, unguarded
    /// write racing the one `save_with_retry` makes atomically below.
    async fn fetch_channel_for_payment(&self, channel_id: &str) -> Result<(Channel, bool), VendorError> {
        if let Some(channel) = self.store.get_channel(channel_id).await {
            return Ok((self.verify_ownership(channel)?, false));
        }
        Ok((self.verify_channel_with_issuer(channel_id).await?, true))
    }

    async fn verify_channel_with_issuer(&self, channel_id: &str) -> Result<Channel, VendorError> {
        let summary = self.issuer.get_channel(channel_id).await?;
        let channel = channel_from_summary(&summary)?;
        self.verify_ownership(channel)
    }

    fn verify_ownership(&self, channel: Channel) -> Result<Channel, VendorError> {
        if channel.common().vendor_public_key_der_b64 != self.public_key_der_b64() {
            return Err(CoreError::VendorMismatch.into());
        }
        Ok(channel)
    }

    /// Persists `new_state` for `channel_id`, reconciling the race between
    /// two vendor processes accepting the first payment on a channel
    /// neither has cached yet.
    ///
    /// Up to two passes: if `is_first_payment`, first tries to create the
    /// channel and its initial state atomically; a collision there means
    /// someone else won the race, so this re-reads the now-cached channel
    /// and falls through to the ordinary `save_*_payment` call below. If
    /// that call reports the channel missing, the channel is re-verified
    /// against the issuer and the whole sequence is retried exactly once;
    /// a second miss is an inconsistent-state error.
    async fn save_with_retry(
        &self,
        channel_id: &str,
        mut channel: Channel,
        mut is_first_payment: bool,
        new_state: PaymentState,
        kind: PaymentKind,
    ) -> Result<SavePaymentResult, VendorError> {
        for attempt in 0..2 {
            if is_first_payment {
                match self.store.save_channel_and_initial_state(channel.clone(), new_state.clone()).await {
                    SaveInitialResult::Created => return Ok(SavePaymentResult::Stored(new_state)),
                    SaveInitialResult::Collision => {
                        is_first_payment = false;
                        channel = self.store.get_channel(channel_id).await.ok_or_else(|| {
                            CoreError::InvariantViolation(
                                "channel missing from cache immediately after a save collision".to_owned(),
                            )
                        })?;
                    }
                }
            }

            let result = match kind {
                PaymentKind::Signature => self.store.save_signature_payment(channel_id, new_state.clone()).await,
                PaymentKind::Payword => self.store.save_payword_payment(channel_id, new_state.clone()).await,
                PaymentKind::Paytree => self.store.save_paytree_payment(channel_id, new_state.clone()).await,
            };

            if !matches!(result, SavePaymentResult::ChannelMissing) {
                return Ok(result);
            }

            if attempt == 0 {
                channel = self.verify_channel_with_issuer(channel_id).await?;
                is_first_payment = true;
            }
        }

        Err(CoreError::InvariantViolation(
            "channel still missing from cache after re-verifying it against the issuer".to_owned(),
        )
        .into())
    }

    /// Accepts a signature-variant streaming payment: a strictly increasing
    /// cumulative owed amount, signed by the client.
    ///
    /// # Errors
    ///
    /// Returns [`VendorError`] if the channel is closed, not a signature
    /// channel, the envelope fails to verify, the counter does not strictly
    /// increase, or the cumulative amount exceeds the locked capacity. A
    /// byte-identical resubmission of the latest accepted payment succeeds
    /// idempotently and returns the same receipt.
    pub async fn receive_signature_payment(
        &self,
        channel_id: &str,
        envelope: Envelope,
    ) -> Result<PaymentReceipt, VendorError> {
        let (channel, is_first_payment) = self.fetch_channel_for_payment(channel_id).await?;
        let common = channel.common();
        if common.is_closed {
            return Err(CoreError::ChannelClosed(channel_id.to_owned()).into());
        }
        if !matches!(channel, Channel::Signature(_)) {
            return Err(CoreError::ModeMismatch.into());
        }

        let client_key = PublicKey::from_der_b64(&common.client_public_key_der_b64).map_err(CoreError::from)?;
        let payload_bytes = verify_envelope_and_get_payload_bytes(&client_key, &envelope).map_err(CoreError::from)?;
        let payment: SignaturePayment = serde_json::from_slice(&payload_bytes)?;
        if payment.channel_id != channel_id {
            return Err(
                CoreError::InvalidSignature("payment channel id does not match the path".to_owned()).into(),
            );
        }

        if let Some(PaymentState::Signature {
            cumulative_owed_amount,
            payload_b64,
            signature_b64,
            ..
        }) = self.store.get_payment_state(channel_id).await
        {
            if payment.cumulative_owed_amount == cumulative_owed_amount {
                if payload_b64 != envelope.payload_b64 || signature_b64 != envelope.signature_b64 {
                    return Err(CoreError::Replay.into());
                }
                return Ok(receipt_from_state(
                    channel_id,
                    &PaymentState::Signature {
                        cumulative_owed_amount,
                        payload_b64,
                        signature_b64,
                        created_at: Timestamp::now(),
                    },
                ));
            }
            if payment.cumulative_owed_amount < cumulative_owed_amount {
                return Err(CoreError::NonMonotonic {
                    new: payment.cumulative_owed_amount,
                    stored: cumulative_owed_amount,
                }
                .into());
            }
        }

        if payment.cumulative_owed_amount > common.amount {
            return Err(CoreError::CapacityExceeded("cumulative amount exceeds locked capacity".to_owned()).into());
        }

        let new_state = PaymentState::Signature {
            cumulative_owed_amount: payment.cumulative_owed_amount,
            payload_b64: envelope.payload_b64.clone(),
            signature_b64: envelope.signature_b64.clone(),
            created_at: Timestamp::now(),
        };

        match self
            .save_with_retry(channel_id, channel, is_first_payment, new_state, PaymentKind::Signature)
            .await?
        {
            SavePaymentResult::Stored(state) => Ok(receipt_from_state(channel_id, &state)),
            SavePaymentResult::Rejected(state) => Err(CoreError::NonMonotonic {
                new: payment.cumulative_owed_amount,
                stored: state.ordering_key(),
            }
            .into()),
            SavePaymentResult::ChannelMissing => Err(CoreError::InvariantViolation(
                "channel vanished from local cache mid-payment".to_owned(),
            )
            .into()),
            SavePaymentResult::WindowExceeded(state) => Err(CoreError::CapacityExceeded(format!(
                "cumulative amount exceeds window, stored={}",
                state.ordering_key()
            ))
            .into()),
        }
    }

    /// Accepts a `PayWord` streaming payment: the first payment verifies
    /// directly against the published root, every later one verifies
    /// incrementally against the previously accepted token.
    ///
    /// # Errors
    ///
    /// Returns [`VendorError`] if the channel is closed, not a `PayWord`
    /// channel, the envelope fails to verify, the token does not hash to the
    /// expected value, or `k` does not strictly increase or exceeds the
    /// channel's commitment window.
    pub async fn receive_payword_payment(
        &self,
        channel_id: &str,
        envelope: Envelope,
    ) -> Result<PaymentReceipt, VendorError> {
        let (channel, is_first_payment) = self.fetch_channel_for_payment(channel_id).await?;
        let common = channel.common();
        if common.is_closed {
            return Err(CoreError::ChannelClosed(channel_id.to_owned()).into());
        }
        let Channel::Payword { root, .. } = &channel else {
            return Err(CoreError::ModeMismatch.into());
        };

        let client_key = PublicKey::from_der_b64(&common.client_public_key_der_b64).map_err(CoreError::from)?;
        let payload_bytes = verify_envelope_and_get_payload_bytes(&client_key, &envelope).map_err(CoreError::from)?;
        let payment: PaywordPayment = serde_json::from_slice(&payload_bytes)?;
        if payment.channel_id != channel_id {
            return Err(
                CoreError::InvalidSignature("payment channel id does not match the path".to_owned()).into(),
            );
        }
        let token = decode_hash32(&payment.token_b64)?;

        let prev = self.store.get_payment_state(channel_id).await;
        match &prev {
            None => {
                if !verify_token_against_root(&token, payment.k, root) {
                    return Err(
                        CoreError::InvalidSignature("token does not verify against the root".to_owned()).into(),
                    );
                }
            }
            Some(PaymentState::Payword {
                k: prev_k,
                token: prev_token,
                ..
            }) => {
                if payment.k == *prev_k {
                    if token == *prev_token {
                        return Ok(receipt_from_state(channel_id, prev.as_ref().expect("checked Some")));
                    }
                    return Err(CoreError::Replay.into());
                }
                if payment.k < *prev_k {
                    return Err(CoreError::NonMonotonic {
                        new: payment.k,
                        stored: *prev_k,
                    }
                    .into());
                }
                if !verify_token_incremental(&token, payment.k, prev_token, *prev_k) {
                    return Err(CoreError::InvalidSignature(
                        "token does not verify incrementally against the prior token".to_owned(),
                    )
                    .into());
                }
            }
            Some(_) => return Err(CoreError::ModeMismatch.into()),
        }

        let new_state = PaymentState::Payword {
            k: payment.k,
            token,
            created_at: Timestamp::now(),
        };

        match self
            .save_with_retry(channel_id, channel, is_first_payment, new_state, PaymentKind::Payword)
            .await?
        {
            SavePaymentResult::Stored(state) => Ok(receipt_from_state(channel_id, &state)),
            SavePaymentResult::Rejected(state) => Err(CoreError::NonMonotonic {
                new: payment.k,
                stored: state.ordering_key(),
            }
            .into()),
            SavePaymentResult::ChannelMissing => Err(CoreError::InvariantViolation(
                "channel vanished from local cache mid-payment".to_owned(),
            )
            .into()),
            SavePaymentResult::WindowExceeded(state) => {
                Err(CoreError::CapacityExceeded(format!("k exceeds window, stored={}", state.ordering_key())).into())
            }
        }
    }

    /// Accepts a `PayTree` streaming payment for whichever subtype (plain,
    /// first-opt, or second-opt) the channel was opened with, maintaining
    /// whatever verifier-side cache that subtype requires.
    ///
    /// # Errors
    ///
    /// Returns [`VendorError`] if the channel is closed, not a `PayTree`
    /// channel, the envelope fails to verify, the pruned proof cannot be
    /// reconstructed or does not recompute the channel's root, or `i` does
    /// not strictly increase or exceeds the channel's commitment window.
    pub async fn receive_paytree_payment(
        &self,
        channel_id: &str,
        envelope: Envelope,
    ) -> Result<PaymentReceipt, VendorError> {
        let (channel, is_first_payment) = self.fetch_channel_for_payment(channel_id).await?;
        let common = channel.common();
        if common.is_closed {
            return Err(CoreError::ChannelClosed(channel_id.to_owned()).into());
        }
        let Channel::Paytree { variant, root, max_i, .. } = &channel else {
            return Err(CoreError::ModeMismatch.into());
        };

        let client_key = PublicKey::from_der_b64(&common.client_public_key_der_b64).map_err(CoreError::from)?;
        let payload_bytes = verify_envelope_and_get_payload_bytes(&client_key, &envelope).map_err(CoreError::from)?;
        let proof: PayTreeProof = serde_json::from_slice(&payload_bytes)?;
        if proof.channel_id != channel_id {
            return Err(
                CoreError::InvalidSignature("payment channel id does not match the path".to_owned()).into(),
            );
        }

        let leaf_secret = STANDARD.decode(&proof.leaf_b64)?;
        let leaf = hash_leaf(&leaf_secret);
        let mut sent_siblings = Vec::with_capacity(proof.siblings_b64.len());
        for sibling_b64 in &proof.siblings_b64 {
            sent_siblings.push(decode_hash32(sibling_b64)?);
        }
        let depth = tree_depth(max_i.saturating_add(1));

        let prev = self.store.get_payment_state(channel_id).await;
        if let Some(PaymentState::Paytree { i: prev_i, .. }) = &prev {
            if proof.i < *prev_i {
                return Err(CoreError::NonMonotonic {
                    new: proof.i,
                    stored: *prev_i,
                }
                .into());
            }
            if proof.i == *prev_i {
                return Ok(receipt_from_state(channel_id, prev.as_ref().expect("checked Some")));
            }
        }

        let (full_siblings, node_cache) = match variant {
            ChannelScheme::Paytree => {
                if !verify_proof(root, &leaf, &sent_siblings, proof.i, depth) {
                    return Err(CoreError::InvalidProof.into());
                }
                (sent_siblings, None)
            }
            ChannelScheme::PaytreeFirstOpt => {
                let (last_verified_index, cache) = match &prev {
                    Some(PaymentState::Paytree { i, siblings, .. }) => (Some(*i), first_opt::update_cache(*i, siblings)),
                    _ => (None, HashMap::new()),
                };
                let (full, _) = first_opt::verify_pruned_proof(
                    root,
                    &leaf,
                    proof.i,
                    depth,
                    last_verified_index,
                    &sent_siblings,
                    &cache,
                )
                .ok_or(CoreError::InvalidProof)?;
                (full, None)
            }
            ChannelScheme::PaytreeSecondOpt => {
                let cache = match &prev {
                    Some(PaymentState::Paytree {
                        node_cache: Some(cache),
                        ..
                    }) => cache.clone(),
                    _ => HashMap::new(),
                };
                let (full, new_cache) =
                    second_opt::verify_pruned_proof(root, &leaf, proof.i, depth, &sent_siblings, &cache)
                        .ok_or(CoreError::InvalidProof)?;
                (full, Some(new_cache))
            }
            ChannelScheme::Signature | ChannelScheme::Payword => {
                return Err(CoreError::ModeMismatch.into());
            }
        };

        let new_state = PaymentState::Paytree {
            i: proof.i,
            leaf_secret_b64: proof.leaf_b64.clone(),
            siblings: full_siblings,
            node_cache,
            created_at: Timestamp::now(),
        };

        match self
            .save_with_retry(channel_id, channel, is_first_payment, new_state, PaymentKind::Paytree)
            .await?
        {
            SavePaymentResult::Stored(state) => Ok(receipt_from_state(channel_id, &state)),
            SavePaymentResult::Rejected(state) => Err(CoreError::NonMonotonic {
                new: proof.i,
                stored: state.ordering_key(),
            }
            .into()),
            SavePaymentResult::ChannelMissing => Err(CoreError::InvariantViolation(
                "channel vanished from local cache mid-payment".to_owned(),
            )
            .into()),
            SavePaymentResult::WindowExceeded(state) => {
                Err(CoreError::CapacityExceeded(format!("i exceeds window, stored={}", state.ordering_key())).into())
            }
        }
    }

    /// Submits a closure/settlement request to the issuer for whichever
    /// scheme the channel carries, built from the latest accepted payment.
    ///
    /// For a signature channel, the vendor re-signs the exact payload bytes
    /// the client already signed for its latest accepted payment: the
    /// streaming payload shape (`{channel_id, cumulative_owed_amount}`) and
    /// the close payload shape are identical, so no new payload is
    /// constructed at closure time.
    ///
    /// # Errors
    ///
    /// Returns [`VendorError`] if the channel is closed, no payment has ever
    /// been accepted on it, or the issuer rejects the settlement.
    pub async fn request_closure(&self, channel_id: &str) -> Result<CloseChannelResponse, VendorError> {
        let channel = self.get_or_fetch_channel(channel_id).await?;
        let common = channel.common();
        if common.is_closed {
            return Err(CoreError::ChannelClosed(channel_id.to_owned()).into());
        }

        let state = self
            .store
            .get_payment_state(channel_id)
            .await
            .ok_or_else(|| CoreError::InvariantViolation("no accepted payment to settle".to_owned()))?;

        match (&channel, state) {
            (Channel::Signature(_), PaymentState::Signature { payload_b64, signature_b64, .. }) => {
                let payload_bytes = STANDARD.decode(&payload_b64)?;
                let vendor_close_signature_b64 = sign_bytes(&self.vendor_key, &payload_bytes);
                let request = SignatureCloseRequest {
                    close_payload_b64: payload_b64,
                    client_close_signature_b64: signature_b64,
                    vendor_close_signature_b64,
                };
                Ok(self.issuer.post_settlement(channel_id, &request).await?)
            }
            (Channel::Payword { .. }, PaymentState::Payword { k, token, .. }) => {
                let token_b64 = STANDARD.encode(token);
                let settlement_payload = PaywordPayment {
                    channel_id: channel_id.to_owned(),
                    k,
                    token_b64: token_b64.clone(),
                };
                let payload_bytes = canonical_json_bytes(&settlement_payload)
                    .map_err(|e| CoreError::InvariantViolation(e.to_string()))?;
                let vendor_signature_b64 = sign_bytes(&self.vendor_key, &payload_bytes);
                let request = PaywordSettleRequest {
                    vendor_public_key_der_b64: self.public_key_der_b64(),
                    k,
                    token_b64,
                    vendor_signature_b64,
                };
                Ok(self.issuer.post_settlement(channel_id, &request).await?)
            }
            (Channel::Paytree { .. }, PaymentState::Paytree { i, leaf_secret_b64, siblings, .. }) => {
                let siblings_b64: Vec<String> = siblings.iter().map(|s| STANDARD.encode(s)).collect();
                let settlement_payload = PayTreeProof {
                    channel_id: channel_id.to_owned(),
                    i,
                    leaf_b64: leaf_secret_b64.clone(),
                    siblings_b64: siblings_b64.clone(),
                };
                let payload_bytes = canonical_json_bytes(&settlement_payload)
                    .map_err(|e| CoreError::InvariantViolation(e.to_string()))?;
                let vendor_signature_b64 = sign_bytes(&self.vendor_key, &payload_bytes);
                let request = PaytreeSettleRequest {
                    vendor_public_key_der_b64: self.public_key_der_b64(),
                    i,
                    leaf_b64: leaf_secret_b64,
                    siblings_b64,
                    vendor_signature_b64,
                };
                Ok(self.issuer.post_settlement(channel_id, &request).await?)
            }
            _ => Err(CoreError::InvariantViolation("stored state does not match the channel's own scheme".to_owned()).into()),
        }
    }
}

fn decode_hash32(value_b64: &str) -> Result<Hash32, VendorError> {
    let bytes = STANDARD.decode(value_b64)?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| VendorError::InvalidHashLength(len))
}

/// Converts the issuer's wire summary into the locally cached channel
/// record. `salt_b64` and `created_at` are not carried on [`ChannelSummary`]
/// (the salt only ever mattered for the issuer's own channel-id derivation,
/// already done; `created_at` is informational) so this fills in harmless
/// placeholders rather than threading new fields through the wire type.
fn channel_from_summary(summary: &ChannelSummary) -> Result<Channel, VendorError> {
    let common = ChannelCommon {
        channel_id: summary.channel_id.clone(),
        client_public_key_der_b64: summary.client_public_key_der_b64.clone(),
        vendor_public_key_der_b64: summary.vendor_public_key_der_b64.clone(),
        salt_b64: String::new(),
        amount: summary.amount,
        balance: summary.balance,
        is_closed: summary.is_closed,
        created_at: Timestamp::now(),
        closed_at: None,
    };

    Ok(match summary.scheme {
        ChannelScheme::Signature => Channel::Signature(common),
        ChannelScheme::Payword => {
            let root = decode_hash32(summary.root_b64.as_deref().unwrap_or_default())?;
            Channel::Payword {
                common,
                root,
                unit_value: summary.unit_value.unwrap_or(0),
                max_k: summary.max_counter.unwrap_or(0),
            }
        }
        variant @ (ChannelScheme::Paytree | ChannelScheme::PaytreeFirstOpt | ChannelScheme::PaytreeSecondOpt) => {
            let root = decode_hash32(summary.root_b64.as_deref().unwrap_or_default())?;
            Channel::Paytree {
                common,
                variant,
                root,
                unit_value: summary.unit_value.unwrap_or(0),
                max_i: summary.max_counter.unwrap_or(0),
            }
        }
    })
}

fn receipt_from_state(channel_id: &str, state: &PaymentState) -> PaymentReceipt {
    match state {
        PaymentState::Signature {
            cumulative_owed_amount,
            payload_b64,
            signature_b64,
            created_at,
        } => PaymentReceipt::Signature {
            channel_id: channel_id.to_owned(),
            cumulative_owed_amount: *cumulative_owed_amount,
            payload_b64: payload_b64.clone(),
            signature_b64: signature_b64.clone(),
            created_at: created_at.to_rfc3339(),
        },
        PaymentState::Payword { k, token, created_at } => PaymentReceipt::Payword {
            channel_id: channel_id.to_owned(),
            k: *k,
            token_b64: STANDARD.encode(token),
            created_at: created_at.to_rfc3339(),
        },
        PaymentState::Paytree {
            i,
            leaf_secret_b64,
            siblings,
            node_cache,
            created_at,
        } => PaymentReceipt::Paytree {
            channel_id: channel_id.to_owned(),
            i: *i,
            leaf_b64: leaf_secret_b64.clone(),
            siblings_b64: siblings.iter().map(|s| STANDARD.encode(s)).collect(),
            node_cache_b64: node_cache
                .as_ref()
                .map(|cache| cache.iter().map(|(k, v)| (k.clone(), STANDARD.encode(v))).collect()),
            created_at: created_at.to_rfc3339(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rand::rngs::OsRng;
    use rand::RngCore;
    use tollgate_core::crypto::keys::generate_envelope;
    use tollgate_core::crypto::payword::{build_hash_chain, compute_cumulative_owed_amount};
    use tollgate_core::crypto::paytree::MerkleTree;
    use tollgate_storage::memory::InMemoryStore;

    fn random_key() -> PrivateKey {
        use p256::ecdsa::SigningKey;
        use p256::pkcs8::EncodePrivateKey;
        let signing = SigningKey::random(&mut OsRng);
        let pem = signing.to_pkcs8_pem(p256::pkcs8::LineEnding::LF).expect("encodes");
        let mut suffix = [0u8; 8];
        OsRng.fill_bytes(&mut suffix);
        let path = std::env::temp_dir().join(format!(
            "tollgate-vendor-test-{}.pem",
            suffix.iter().map(|b| format!("{b:02x}")).collect::<String>()
        ));
        std::fs::write(&path, pem.as_bytes()).expect("writes");
        let key = PrivateKey::from_pem_file(&path).expect("loads");
        let _ = std::fs::remove_file(&path);
        key
    }

    fn issuer_client() -> IssuerClient {
        IssuerClient::new("http://127.0.0.1:1", Duration::from_millis(1)).expect("builds")
    }

    fn signature_channel(id: &str, vendor: &PrivateKey, client: &PrivateKey, amount: u64) -> Channel {
        Channel::Signature(ChannelCommon {
            channel_id: id.to_owned(),
            client_public_key_der_b64: client.public_key().der_b64().to_owned(),
            vendor_public_key_der_b64: vendor.public_key().der_b64().to_owned(),
            salt_b64: String::new(),
            amount,
            balance: 0,
            is_closed: false,
            created_at: Timestamp::now(),
            closed_at: None,
        })
    }

    #[tokio::test]
    async fn accepts_first_and_then_strictly_increasing_signature_payments() {
        let store = Arc::new(InMemoryStore::new());
        let vendor = random_key();
        let client = random_key();
        store
            .create_channel_exclusive(signature_channel("c1", &vendor, &client, 1_000))
            .await;
        let service = VendorService::new(store, vendor, issuer_client());

        let payload = SignaturePayment {
            channel_id: "c1".to_owned(),
            cumulative_owed_amount: 10,
        };
        let payload_bytes = canonical_json_bytes(&payload).expect("encodes");
        let envelope = generate_envelope(&client, &payload_bytes);
        let receipt = service
            .receive_signature_payment("c1", envelope)
            .await
            .expect("accepts first payment");
        assert!(matches!(receipt, PaymentReceipt::Signature { cumulative_owed_amount: 10, .. }));

        let payload2 = SignaturePayment {
            channel_id: "c1".to_owned(),
            cumulative_owed_amount: 5,
        };
        let payload_bytes2 = canonical_json_bytes(&payload2).expect("encodes");
        let envelope2 = generate_envelope(&client, &payload_bytes2);
        let err = service
            .receive_signature_payment("c1", envelope2)
            .await
            .expect_err("lower counter rejected");
        assert!(matches!(err, VendorError::Core(CoreError::NonMonotonic { .. })));
    }

    #[tokio::test]
    async fn payword_first_payment_verifies_against_root_then_incrementally() {
        let vendor = random_key();
        let client = random_key();
        let seed = [7u8; 32];
        let n = 10u64;
        let chain = build_hash_chain(seed, n);
        let root = chain[usize::try_from(n).unwrap()];

        let store = Arc::new(InMemoryStore::new());
        store
            .create_channel_exclusive(Channel::Payword {
                common: ChannelCommon {
                    channel_id: "pw1".to_owned(),
                    client_public_key_der_b64: client.public_key().der_b64().to_owned(),
                    vendor_public_key_der_b64: vendor.public_key().der_b64().to_owned(),
                    salt_b64: String::new(),
                    amount: 1_000,
                    balance: 0,
                    is_closed: false,
                    created_at: Timestamp::now(),
                    closed_at: None,
                },
                root,
                unit_value: 10,
                max_k: n,
            })
            .await;
        let service = VendorService::new(store, vendor, issuer_client());

        let k1 = 3u64;
        let token1 = chain[usize::try_from(n - k1).unwrap()];
        let payload1 = PaywordPayment {
            channel_id: "pw1".to_owned(),
            k: k1,
            token_b64: STANDARD.encode(token1),
        };
        let bytes1 = canonical_json_bytes(&payload1).expect("encodes");
        let envelope1 = generate_envelope(&client, &bytes1);
        let receipt1 = service
            .receive_payword_payment("pw1", envelope1)
            .await
            .expect("first payment verifies against root");
        assert!(matches!(receipt1, PaymentReceipt::Payword { k: 3, .. }));

        let k2 = 6u64;
        let token2 = chain[usize::try_from(n - k2).unwrap()];
        let payload2 = PaywordPayment {
            channel_id: "pw1".to_owned(),
            k: k2,
            token_b64: STANDARD.encode(token2),
        };
        let bytes2 = canonical_json_bytes(&payload2).expect("encodes");
        let envelope2 = generate_envelope(&client, &bytes2);
        let receipt2 = service
            .receive_payword_payment("pw1", envelope2)
            .await
            .expect("second payment verifies incrementally");
        assert!(matches!(receipt2, PaymentReceipt::Payword { k: 6, .. }));

        let expected_owed = compute_cumulative_owed_amount(k2, 10);
        assert_eq!(expected_owed, 60);
    }

    #[tokio::test]
    async fn paytree_first_opt_prunes_after_first_proof() {
        let vendor = random_key();
        let client = random_key();
        let leaves: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 32]).collect();
        let tree = MerkleTree::build(&leaves);
        let root = tree.root();
        let depth = tree.depth();

        let store = Arc::new(InMemoryStore::new());
        store
            .create_channel_exclusive(Channel::Paytree {
                common: ChannelCommon {
                    channel_id: "pt1".to_owned(),
                    client_public_key_der_b64: client.public_key().der_b64().to_owned(),
                    vendor_public_key_der_b64: vendor.public_key().der_b64().to_owned(),
                    salt_b64: String::new(),
                    amount: 1_000,
                    balance: 0,
                    is_closed: false,
                    created_at: Timestamp::now(),
                    closed_at: None,
                },
                variant: ChannelScheme::PaytreeFirstOpt,
                root,
                unit_value: 10,
                max_i: 7,
            })
            .await;
        let service = VendorService::new(store, vendor, issuer_client());

        let full0 = tree.full_siblings(0);
        let proof0 = PayTreeProof {
            channel_id: "pt1".to_owned(),
            i: 0,
            leaf_b64: STANDARD.encode(&leaves[0]),
            siblings_b64: full0.iter().map(|s| STANDARD.encode(s)).collect(),
        };
        let bytes0 = canonical_json_bytes(&proof0).expect("encodes");
        let envelope0 = generate_envelope(&client, &bytes0);
        let receipt0 = service
            .receive_paytree_payment("pt1", envelope0)
            .await
            .expect("first proof verifies in full");
        let PaymentReceipt::Paytree { siblings_b64, .. } = receipt0 else {
            panic!("expected paytree receipt")
        };
        assert_eq!(siblings_b64.len(), usize::try_from(depth).unwrap());

        let full1 = tree.full_siblings(1);
        let send_levels = first_opt::compute_send_levels(1, Some(0), depth);
        let pruned: Vec<String> = send_levels.iter().map(|&l| STANDARD.encode(full1[l as usize])).collect();
        let proof1 = PayTreeProof {
            channel_id: "pt1".to_owned(),
            i: 1,
            leaf_b64: STANDARD.encode(&leaves[1]),
            siblings_b64: pruned,
        };
        let bytes1 = canonical_json_bytes(&proof1).expect("encodes");
        let envelope1 = generate_envelope(&client, &bytes1);
        let receipt1 = service
            .receive_paytree_payment("pt1", envelope1)
            .await
            .expect("pruned proof reconstructs from the vendor's own cache");
        let PaymentReceipt::Paytree { siblings_b64, .. } = receipt1 else {
            panic!("expected paytree receipt")
        };
        assert_eq!(siblings_b64.len(), usize::try_from(depth).unwrap());
    }

    #[tokio::test]
    async fn save_with_retry_stores_first_payment_atomically() {
        let vendor = random_key();
        let client = random_key();
        let channel = signature_channel("c-first", &vendor, &client, 1_000);
        let store = Arc::new(InMemoryStore::new());
        let service = VendorService::new(store.clone(), vendor, issuer_client());

        let new_state = PaymentState::Signature {
            cumulative_owed_amount: 10,
            payload_b64: "p".to_owned(),
            signature_b64: "s".to_owned(),
            created_at: Timestamp::now(),
        };

        let result = service
            .save_with_retry("c-first", channel, true, new_state.clone(), PaymentKind::Signature)
            .await
            .expect("first-payment save succeeds");
        assert!(matches!(result, SavePaymentResult::Stored(_)));
        assert!(store.get_channel("c-first").await.is_some());
        assert_eq!(store.get_payment_state("c-first").await, Some(new_state));
    }

    #[tokio::test]
    async fn save_with_retry_falls_through_after_initial_save_collision() {
        let vendor = random_key();
        let client = random_key();
        let channel = signature_channel("c-race", &vendor, &client, 1_000);
        let store = Arc::new(InMemoryStore::new());

        // Simulate a concurrent vendor process that already won the race to
        // cache this channel and store its first payment.
        let earlier_state = PaymentState::Signature {
            cumulative_owed_amount: 10,
            payload_b64: "p0".to_owned(),
            signature_b64: "s0".to_owned(),
            created_at: Timestamp::now(),
        };
        store
            .save_channel_and_initial_state(channel.clone(), earlier_state)
            .await;

        let service = VendorService::new(store.clone(), vendor, issuer_client());
        let later_state = PaymentState::Signature {
            cumulative_owed_amount: 20,
            payload_b64: "p1".to_owned(),
            signature_b64: "s1".to_owned(),
            created_at: Timestamp::now(),
        };

        let result = service
            .save_with_retry("c-race", channel, true, later_state.clone(), PaymentKind::Signature)
            .await
            .expect("falls through to the ordinary save after the collision");
        assert!(matches!(result, SavePaymentResult::Stored(_)));
        assert_eq!(store.get_payment_state("c-race").await, Some(later_state));
    }
}
