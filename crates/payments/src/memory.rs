use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MessageId, Money, OrderCreated, PaymentResult, message_types};
use mailbox::{InboxRecord, MailboxTables, OutboxRecord, OutboxStore};
use tokio::sync::RwLock;

use crate::account::charge;
use crate::store::{PaymentOutcome, PaymentStore};
use crate::{Account, PaymentsError, Result};

#[derive(Debug, Default)]
struct PaymentState {
    accounts: HashMap<String, Account>,
    mailbox: MailboxTables,
}

/// In-memory payment store for testing and local development.
///
/// Accounts and mailbox tables share one lock, so every operation is
/// atomic and concurrent debits and deposits serialize.
#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    state: Arc<RwLock<PaymentState>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every outbox record.
    pub async fn outbox_records(&self) -> Vec<OutboxRecord> {
        self.state.read().await.mailbox.outbox().to_vec()
    }

    /// Returns a copy of every inbox record.
    pub async fn inbox_records(&self) -> Vec<InboxRecord> {
        self.state.read().await.mailbox.inbox().to_vec()
    }
}

#[async_trait]
impl OutboxStore for InMemoryPaymentStore {
    async fn fetch_unprocessed(&self, limit: usize) -> mailbox::Result<Vec<OutboxRecord>> {
        Ok(self.state.read().await.mailbox.unprocessed(limit))
    }

    async fn mark_processed(&self, ids: &[MessageId], at: DateTime<Utc>) -> mailbox::Result<()> {
        self.state.write().await.mailbox.mark_processed(ids, at);
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create_account(&self, user_id: &str) -> Result<Account> {
        let mut state = self.state.write().await;
        if state.accounts.contains_key(user_id) {
            return Err(PaymentsError::AccountExists(user_id.to_string()));
        }

        let account = Account::open(user_id);
        state.accounts.insert(user_id.to_string(), account.clone());
        Ok(account)
    }

    async fn deposit(&self, user_id: &str, amount: Money) -> Result<Account> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| PaymentsError::AccountNotFound(user_id.to_string()))?;

        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| PaymentsError::Validation("Deposit exceeds the maximum balance".into()))?;
        Ok(account.clone())
    }

    async fn get_account(&self, user_id: &str) -> Result<Option<Account>> {
        Ok(self.state.read().await.accounts.get(user_id).cloned())
    }

    async fn apply_order_payment(&self, event: &OrderCreated, raw: &str) -> Result<PaymentOutcome> {
        let mut state = self.state.write().await;
        let event_key = event.event_key();

        if state.mailbox.has_inbox(message_types::ORDER_CREATED, &event_key) {
            return Ok(PaymentOutcome::Duplicate);
        }

        // Work on a copy so nothing is written unless every step succeeds.
        let mut account = state.accounts.get(&event.user_id).cloned();
        let status = charge(account.as_mut(), event.amount);
        let result = OutboxRecord::new(
            message_types::PAYMENT_RESULT,
            &PaymentResult {
                id: event.id,
                status,
            },
        )?;

        let now = Utc::now();
        let inbox = InboxRecord::received(message_types::ORDER_CREATED, event_key, raw);
        let inbox_id = inbox.id;

        state.mailbox.record_inbox(inbox);
        if let Some(account) = account {
            state.accounts.insert(account.user_id.clone(), account);
        }
        state.mailbox.mark_inbox_processed(inbox_id, now);
        state.mailbox.enqueue(result);

        Ok(PaymentOutcome::Applied(status))
    }
}
