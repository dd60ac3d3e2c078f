//! Atomic key-value storage contract for the tollgate protocol.
//!
//! [`KvStore`] is the only primitive the issuer and vendor services trust
//! for anything safety-relevant: plain `get`/`set` calls are fine for
//! read-mostly data (accounts, channel metadata lookups), but every write
//! that must observe-and-mutate without interleaving goes through one of
//! the five named atomic operations below. No caller is trusted to read,
//! compare, and write back on its own — see [`memory::InMemoryStore`] for
//! why that matters under concurrency.

pub mod memory;

use async_trait::async_trait;

use tollgate_core::model::{Account, Channel, PaymentState};

/// Status of a channel for the listing index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Every channel, open or closed.
    All,
    /// Only channels still open.
    Open,
    /// Only settled, closed channels.
    Closed,
}

/// Outcome of [`KvStore::create_channel_exclusive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateChannelResult {
    /// The channel record did not exist and was written.
    Created,
    /// A channel already existed at this id.
    AlreadyExists,
}

/// Outcome of [`KvStore::save_channel_and_initial_state`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveInitialResult {
    /// Neither the channel nor the state record existed; both were written.
    Created,
    /// One of the two records already existed; nothing was written.
    Collision,
}

/// Outcome of a `save_*_payment` atomic operation. Mirrors the four-way
/// status code contract: stored, rejected-not-monotonic, channel-missing,
/// and (`PayWord`/`PayTree` only) window-exceeded. The signature scheme
/// never produces [`SavePaymentResult::WindowExceeded`]: a capacity
/// overrun there is reported as an ordinary [`SavePaymentResult::Rejected`],
/// matching the reference implementation exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SavePaymentResult {
    /// The new state was strictly greater and replaced the prior one.
    Stored(PaymentState),
    /// The new state was not strictly greater; the stored state is returned
    /// for diagnostics.
    Rejected(PaymentState),
    /// No channel record exists at this id.
    ChannelMissing,
    /// The new counter exceeds the channel's commitment window
    /// (`PayWord`/`PayTree` only).
    WindowExceeded(PaymentState),
}

/// The atomic key-value store contract. All methods are safe to call
/// concurrently from multiple tasks and, in a real deployment, multiple
/// processes sharing one backing store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Looks up an account by public key.
    async fn get_account(&self, public_key_der_b64: &str) -> Option<Account>;

    /// Inserts or overwrites an account record. Not atomic with any other
    /// operation; callers needing read-then-write semantics must use
    /// [`KvStore::adjust_balance`].
    async fn put_account(&self, account: Account);

    /// Atomically adjusts an account's balance by `delta` (which may be
    /// negative) and returns the resulting balance, or `None` if the
    /// account does not exist or the adjustment would make the balance
    /// negative.
    async fn adjust_balance(&self, public_key_der_b64: &str, delta: i64) -> Option<u64>;

    /// Looks up a channel record by id.
    async fn get_channel(&self, channel_id: &str) -> Option<Channel>;

    /// Looks up a channel's latest payment state.
    async fn get_payment_state(&self, channel_id: &str) -> Option<PaymentState>;

    /// Lists channel ids in descending `created_at` order, optionally
    /// filtered by status and paginated with `before`/`limit`.
    async fn list_channel_ids(
        &self,
        status: ChannelStatus,
        before: Option<u64>,
        limit: usize,
    ) -> Vec<String>;

    /// Writes `channel` only if no record exists at its id.
    async fn create_channel_exclusive(&self, channel: Channel) -> CreateChannelResult;

    /// Deletes a channel record. Used only as compensation when a debit
    /// following [`KvStore::create_channel_exclusive`] fails.
    async fn delete_channel(&self, channel_id: &str);

    /// Marks a channel closed, storing its final balance and close time.
    /// Returns `false` if no such channel exists (callers treat this as an
    /// invariant violation, since the channel must have existed to reach
    /// this call).
    async fn close_channel(&self, channel_id: &str, final_balance: u64, closed_at: u64) -> bool;

    /// Writes the channel and its initial payment state atomically, if and
    /// only if neither exists, and updates the `all`/`open` indices.
    async fn save_channel_and_initial_state(
        &self,
        channel: Channel,
        state: PaymentState,
    ) -> SaveInitialResult;

    /// Atomically compares and stores a new signature-variant payment
    /// state. Capacity overrun is reported as [`SavePaymentResult::Rejected`],
    /// not [`SavePaymentResult::WindowExceeded`].
    async fn save_signature_payment(
        &self,
        channel_id: &str,
        new_state: PaymentState,
    ) -> SavePaymentResult;

    /// Atomically compares and stores a new `PayWord` payment state,
    /// enforcing `k <= max_k` internally.
    async fn save_payword_payment(
        &self,
        channel_id: &str,
        new_state: PaymentState,
    ) -> SavePaymentResult;

    /// Atomically compares and stores a new `PayTree` payment state,
    /// enforcing `i <= max_i` internally.
    async fn save_paytree_payment(
        &self,
        channel_id: &str,
        new_state: PaymentState,
    ) -> SavePaymentResult;
}
