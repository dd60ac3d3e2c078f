//! An in-process, `dashmap`-backed [`KvStore`] implementation.
//!
//! Every channel's metadata and latest payment state are stored together
//! under one map entry so that `dashmap`'s per-shard `entry()` locking
//! covers exactly the critical section the named atomic operations need:
//! the whole point of the storage contract is that no caller ever observes
//! a channel's state, decides what to write, and writes it back as two
//! separate operations. Here that is enforced by construction, not by
//! convention, since every mutating method holds the entry's lock for its
//! entire body.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use tollgate_core::model::{Account, Channel, PaymentState};

use crate::{ChannelStatus, CreateChannelResult, KvStore, SaveInitialResult, SavePaymentResult};

struct ChannelEntry {
    channel: Channel,
    state: Option<PaymentState>,
}

/// In-memory reference implementation of [`KvStore`]. Suitable for tests,
/// single-process demos, and as the model the real scripted-Lua-over-Redis
/// implementation in a production deployment must match bit-for-bit.
#[derive(Default)]
pub struct InMemoryStore {
    accounts: DashMap<String, Account>,
    channels: DashMap<String, ChannelEntry>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn max_counter(channel: &Channel) -> Option<u64> {
        match channel {
            Channel::Signature(_) => None,
            Channel::Payword { max_k, .. } => Some(*max_k),
            Channel::Paytree { max_i, .. } => Some(*max_i),
        }
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    async fn get_account(&self, public_key_der_b64: &str) -> Option<Account> {
        self.accounts.get(public_key_der_b64).map(|a| a.clone())
    }

    async fn put_account(&self, account: Account) {
        self.accounts.insert(account.public_key_der_b64.clone(), account);
    }

    async fn adjust_balance(&self, public_key_der_b64: &str, delta: i64) -> Option<u64> {
        let mut entry = self.accounts.get_mut(public_key_der_b64)?;
        let new_balance = i64::try_from(entry.balance).ok()?.checked_add(delta)?;
        if new_balance < 0 {
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        let new_balance = new_balance as u64;
        entry.balance = new_balance;
        Some(new_balance)
    }

    async fn get_channel(&self, channel_id: &str) -> Option<Channel> {
        self.channels.get(channel_id).map(|e| e.channel.clone())
    }

    async fn get_payment_state(&self, channel_id: &str) -> Option<PaymentState> {
        self.channels.get(channel_id).and_then(|e| e.state.clone())
    }

    async fn list_channel_ids(
        &self,
        status: ChannelStatus,
        before: Option<u64>,
        limit: usize,
    ) -> Vec<String> {
        let mut matches: Vec<(u64, String)> = self
            .channels
            .iter()
            .filter(|entry| match status {
                ChannelStatus::All => true,
                ChannelStatus::Open => !entry.channel.common().is_closed,
                ChannelStatus::Closed => entry.channel.common().is_closed,
            })
            .filter(|entry| before.is_none_or(|cutoff| entry.channel.common().created_at.as_secs() < cutoff))
            .map(|entry| (entry.channel.common().created_at.as_secs(), entry.key().clone()))
            .collect();
        matches.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        matches.truncate(limit);
        matches.into_iter().map(|(_, id)| id).collect()
    }

    async fn create_channel_exclusive(&self, channel: Channel) -> CreateChannelResult {
        let channel_id = channel.common().channel_id.clone();
        match self.channels.entry(channel_id) {
            Entry::Occupied(_) => CreateChannelResult::AlreadyExists,
            Entry::Vacant(slot) => {
                slot.insert(ChannelEntry { channel, state: None });
                CreateChannelResult::Created
            }
        }
    }

    async fn delete_channel(&self, channel_id: &str) {
        self.channels.remove(channel_id);
    }

    async fn close_channel(&self, channel_id: &str, final_balance: u64, closed_at: u64) -> bool {
        let Some(mut entry) = self.channels.get_mut(channel_id) else {
            return false;
        };
        let common = entry.channel.common_mut();
        common.balance = final_balance;
        common.is_closed = true;
        common.closed_at = Some(tollgate_core::Timestamp::from_secs(closed_at));
        true
    }

    async fn save_channel_and_initial_state(
        &self,
        channel: Channel,
        state: PaymentState,
    ) -> SaveInitialResult {
        let channel_id = channel.common().channel_id.clone();
        match self.channels.entry(channel_id) {
            Entry::Occupied(_) => SaveInitialResult::Collision,
            Entry::Vacant(slot) => {
                slot.insert(ChannelEntry {
                    channel,
                    state: Some(state),
                });
                SaveInitialResult::Created
            }
        }
    }

    async fn save_signature_payment(
        &self,
        channel_id: &str,
        new_state: PaymentState,
    ) -> SavePaymentResult {
        let Some(mut entry) = self.channels.get_mut(channel_id) else {
            return SavePaymentResult::ChannelMissing;
        };
        let capacity = entry.channel.common().amount;
        let new_amount = new_state.ordering_key();
        let stored_amount = entry.state.as_ref().map_or(0, PaymentState::ordering_key);

        // Capacity overrun on a signature channel reuses the ordinary
        // rejection code; unlike PayWord/PayTree there is no distinct
        // window-exceeded status here.
        if new_amount > capacity || new_amount <= stored_amount {
            return entry
                .state
                .clone()
                .map_or(SavePaymentResult::ChannelMissing, SavePaymentResult::Rejected);
        }

        entry.state = Some(new_state.clone());
        SavePaymentResult::Stored(new_state)
    }

    async fn save_payword_payment(
        &self,
        channel_id: &str,
        new_state: PaymentState,
    ) -> SavePaymentResult {
        self.save_windowed_payment(channel_id, new_state).await
    }

    async fn save_paytree_payment(
        &self,
        channel_id: &str,
        new_state: PaymentState,
    ) -> SavePaymentResult {
        self.save_windowed_payment(channel_id, new_state).await
    }
}

impl InMemoryStore {
    /// Shared body for `PayWord`/`PayTree`: both enforce a commitment
    /// window (`max_k`/`max_i`) with a distinct "exceeded" status code,
    /// unlike the signature scheme's plain rejection.
    async fn save_windowed_payment(
        &self,
        channel_id: &str,
        new_state: PaymentState,
    ) -> SavePaymentResult {
        let Some(mut entry) = self.channels.get_mut(channel_id) else {
            return SavePaymentResult::ChannelMissing;
        };
        let Some(max_counter) = Self::max_counter(&entry.channel) else {
            return SavePaymentResult::ChannelMissing;
        };
        let new_counter = new_state.ordering_key();
        let stored_counter = entry.state.as_ref().map_or(0, PaymentState::ordering_key);

        if new_counter > max_counter {
            let current = entry.state.clone().unwrap_or(new_state);
            return SavePaymentResult::WindowExceeded(current);
        }
        if new_counter <= stored_counter {
            return entry
                .state
                .clone()
                .map_or(SavePaymentResult::ChannelMissing, SavePaymentResult::Rejected);
        }

        entry.state = Some(new_state.clone());
        SavePaymentResult::Stored(new_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::model::ChannelCommon;
    use tollgate_core::Timestamp;

    fn sample_signature_channel(id: &str, amount: u64) -> Channel {
        Channel::Signature(ChannelCommon {
            channel_id: id.to_owned(),
            client_public_key_der_b64: "client".to_owned(),
            vendor_public_key_der_b64: "vendor".to_owned(),
            salt_b64: "salt".to_owned(),
            amount,
            balance: 0,
            is_closed: false,
            created_at: Timestamp::from_secs(1),
            closed_at: None,
        })
    }

    fn signature_state(amount: u64) -> PaymentState {
        PaymentState::Signature {
            cumulative_owed_amount: amount,
            payload_b64: "p".to_owned(),
            signature_b64: "s".to_owned(),
            created_at: Timestamp::from_secs(1),
        }
    }

    #[tokio::test]
    async fn create_channel_exclusive_rejects_duplicate() {
        let store = InMemoryStore::new();
        let channel = sample_signature_channel("c1", 1000);
        assert_eq!(
            store.create_channel_exclusive(channel.clone()).await,
            CreateChannelResult::Created
        );
        assert_eq!(
            store.create_channel_exclusive(channel).await,
            CreateChannelResult::AlreadyExists
        );
    }

    #[tokio::test]
    async fn signature_payment_capacity_overrun_is_plain_rejection() {
        let store = InMemoryStore::new();
        let channel = sample_signature_channel("c1", 100);
        store
            .save_channel_and_initial_state(channel, signature_state(10))
            .await;
        let result = store.save_signature_payment("c1", signature_state(200)).await;
        assert!(matches!(result, SavePaymentResult::Rejected(_)));
    }

    #[tokio::test]
    async fn monotonicity_is_enforced_under_concurrency() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let channel = sample_signature_channel("race", 1000);
        store
            .save_channel_and_initial_state(channel, signature_state(0))
            .await;

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.save_signature_payment("race", signature_state(20)).await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.save_signature_payment("race", signature_state(25)).await })
        };
        let _ = a.await;
        let _ = b.await;

        let final_state = store.get_payment_state("race").await.expect("state exists");
        assert_eq!(final_state.ordering_key(), 25);
    }
}
