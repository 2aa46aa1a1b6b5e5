use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MessageId, OrderCreated, OrderId, message_types};
use mailbox::{MailboxTables, OutboxRecord, OutboxStore};
use tokio::sync::RwLock;

use crate::store::{OrderStore, StatusChange};
use crate::{Order, OrderStatus, Result};

#[derive(Debug, Default)]
struct OrderState {
    orders: HashMap<OrderId, Order>,
    mailbox: MailboxTables,
}

/// In-memory order store for testing and local development.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<OrderState>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every outbox record.
    pub async fn outbox_records(&self) -> Vec<OutboxRecord> {
        self.state.read().await.mailbox.outbox().to_vec()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOrderStore {
    async fn fetch_unprocessed(&self, limit: usize) -> mailbox::Result<Vec<OutboxRecord>> {
        Ok(self.state.read().await.mailbox.unprocessed(limit))
    }

    async fn mark_processed(&self, ids: &[MessageId], at: DateTime<Utc>) -> mailbox::Result<()> {
        self.state.write().await.mailbox.mark_processed(ids, at);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self, order: &Order) -> Result<()> {
        let record = OutboxRecord::new(
            message_types::ORDER_CREATED,
            &OrderCreated {
                id: order.id,
                user_id: order.user_id.clone(),
                amount: order.amount,
            },
        )?;

        let mut state = self.state.write().await;
        state.orders.insert(order.id, order.clone());
        state.mailbox.enqueue(record);
        Ok(())
    }

    async fn list_orders(&self, user_id: &str) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn apply_status(&self, id: OrderId, status: OrderStatus) -> Result<StatusChange> {
        let mut state = self.state.write().await;
        let Some(order) = state.orders.get_mut(&id) else {
            return Ok(StatusChange::NotFound);
        };

        if order.transition(status) {
            Ok(StatusChange::Changed(status))
        } else {
            Ok(StatusChange::Unchanged(order.status))
        }
    }
}
