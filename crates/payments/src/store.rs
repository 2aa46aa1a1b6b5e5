use async_trait::async_trait;
use common::{Money, OrderCreated, PaymentStatus};
use mailbox::OutboxStore;

use crate::{Account, Result};

/// Result of applying an `OrderCreated` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// First delivery: the inbox record, any debit and the `PaymentResult`
    /// outbox record were committed together.
    Applied(PaymentStatus),
    /// The event was applied before; nothing was changed.
    Duplicate,
}

/// Storage for accounts plus the payments mailbox.
///
/// Also the outbox the payments relay reads from.
#[async_trait]
pub trait PaymentStore: OutboxStore {
    /// Creates an empty account. Fails with `AccountExists` if the user
    /// already has one; the existing account is left untouched.
    async fn create_account(&self, user_id: &str) -> Result<Account>;

    /// Adds `amount` to the user's balance in a single atomic step.
    async fn deposit(&self, user_id: &str, amount: Money) -> Result<Account>;

    async fn get_account(&self, user_id: &str) -> Result<Option<Account>>;

    /// Applies an order payment exactly once per order id.
    ///
    /// In one unit of work: records the inbox entry (or detects a duplicate),
    /// charges the account, marks the inbox entry processed and enqueues the
    /// `PaymentResult`. `raw` is the message as received.
    async fn apply_order_payment(&self, event: &OrderCreated, raw: &str) -> Result<PaymentOutcome>;
}
