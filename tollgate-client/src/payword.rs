//! `PayWord` client: hash-chain commitment generation and per-payment
//! token proofs, with midpoint pebbling so that producing a token for
//! counter `k` never requires rehashing from the chain's seed.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;

use tollgate_core::crypto::keys::PrivateKey;
use tollgate_core::crypto::payword::{hash_n, Hash32, PebbleCache};
use tollgate_proto::channel::{OpenChannelCommon, PaywordOpenFields};
use tollgate_proto::envelope::Envelope;
use tollgate_proto::payment::PaywordPayment;
use tollgate_proto::SHA256_ALG;

use crate::error::ClientError;
use crate::signing::sign_payload;

/// Holds the chain seed and a [`PebbleCache`] over it; the only client-side
/// state a `PayWord` channel needs across its lifetime.
#[derive(Debug, Clone)]
pub struct PaywordChannel {
    root: Hash32,
    max_k: u64,
    unit_value: u64,
    cache: PebbleCache,
}

impl PaywordChannel {
    /// Generates a fresh random chain of length `max_k`, trading memory for
    /// hashing by storing up to `pebble_count` midpoint checkpoints.
    #[must_use]
    pub fn generate(max_k: u64, unit_value: u64, pebble_count: usize) -> Self {
        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        let root = hash_n(&seed, max_k);
        let cache = PebbleCache::new(seed, max_k, pebble_count);
        Self {
            root,
            max_k,
            unit_value,
            cache,
        }
    }

    /// The commitment root `w_{max_k}`, to be announced at channel open.
    #[must_use]
    pub fn root_b64(&self) -> String {
        STANDARD.encode(self.root)
    }

    /// The open-channel fields declaring this chain's commitment.
    #[must_use]
    pub fn open_fields(&self) -> PaywordOpenFields {
        PaywordOpenFields {
            payword_root_b64: self.root_b64(),
            payword_unit_value: self.unit_value,
            payword_max_k: self.max_k,
            payword_hash_alg: SHA256_ALG.to_owned(),
        }
    }

    /// Produces the payment payload revealing counter `k`'s token.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::IndexOutOfRange`] if `k` exceeds `max_k`.
    pub fn payment(&self, channel_id: &str, k: u64) -> Result<PaywordPayment, ClientError> {
        if k == 0 || k > self.max_k {
            return Err(ClientError::IndexOutOfRange {
                requested: k,
                max: self.max_k,
            });
        }
        let token = self.cache.token_for_counter(k);
        Ok(PaywordPayment {
            channel_id: channel_id.to_owned(),
            k,
            token_b64: STANDARD.encode(token),
        })
    }
}

/// Builds the signed open-channel envelope for a fresh `PayWord` channel.
///
/// # Errors
///
/// Returns [`ClientError::Canonical`] if the payload cannot be encoded.
pub fn build_open_envelope(
    key: &PrivateKey,
    common: &OpenChannelCommon,
    payword: &PaywordOpenFields,
) -> Result<Envelope, ClientError> {
    sign_payload(key, &OpenPaywordPayload { common, payword })
}

/// Flattened payload signed at channel-open time: the common fields plus
/// this scheme's commitment fields, matching the issuer's flattened
/// `OpenChannelWireRequest` wire shape exactly.
#[derive(serde::Serialize)]
struct OpenPaywordPayload<'a> {
    #[serde(flatten)]
    common: &'a OpenChannelCommon,
    #[serde(flatten)]
    payword: &'a PaywordOpenFields,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::crypto::payword::verify_token_against_root;

    #[test]
    fn tokens_verify_against_the_announced_root() {
        let channel = PaywordChannel::generate(100, 5, 8);
        for k in [1, 2, 50, 99, 100] {
            let payment = channel.payment("chan", k).expect("in range");
            let token_bytes: [u8; 32] = STANDARD
                .decode(&payment.token_b64)
                .expect("valid base64")
                .try_into()
                .expect("32 bytes");
            assert!(verify_token_against_root(&token_bytes, k, &channel.root));
        }
    }

    #[test]
    fn rejects_counter_beyond_max_k() {
        let channel = PaywordChannel::generate(10, 5, 4);
        let err = channel.payment("chan", 11).expect_err("out of range");
        assert!(matches!(err, ClientError::IndexOutOfRange { requested: 11, max: 10 }));
    }
}
