use async_trait::async_trait;
use common::OrderId;
use mailbox::OutboxStore;

use crate::{Order, OrderStatus, Result};

/// Result of applying a payment outcome to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// The status moved to the given value and was persisted.
    Changed(OrderStatus),
    /// Nothing to do: the order already has the given (terminal or equal) status.
    Unchanged(OrderStatus),
    /// No order with that id.
    NotFound,
}

/// Storage for orders plus the orders outbox.
///
/// Also the outbox the orders relay reads from.
#[async_trait]
pub trait OrderStore: OutboxStore {
    /// Persists a new order together with its `OrderCreated` outbox record.
    async fn create_order(&self, order: &Order) -> Result<()>;

    /// All orders of a user, oldest first.
    async fn list_orders(&self, user_id: &str) -> Result<Vec<Order>>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Moves a `New` order to `status` as a single compare-and-set.
    ///
    /// Terminal orders are never modified, so concurrent or repeated
    /// deliveries yield exactly one `Changed`.
    async fn apply_status(&self, id: OrderId, status: OrderStatus) -> Result<StatusChange>;
}
