//! Order operations with input validation.

use common::{Money, OrderId};

use crate::store::OrderStore;
use crate::{Order, OrderStatus, OrdersError, Result};

/// Service for placing and reading orders.
#[derive(Clone)]
pub struct OrderService<S> {
    store: S,
}

impl<S: OrderStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places an order in the `New` status and queues its `OrderCreated` event.
    #[tracing::instrument(skip(self, description))]
    pub async fn create_order(
        &self,
        user_id: &str,
        amount: Money,
        description: &str,
    ) -> Result<Order> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(OrdersError::Validation("userId is required".to_string()));
        }
        if !amount.is_positive() {
            return Err(OrdersError::Validation(format!(
                "Order amount must be positive, got {amount}"
            )));
        }

        let order = Order::new(user_id, amount, description);
        self.store.create_order(&order).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, user_id, %amount, "Order created");
        Ok(order)
    }

    /// Lists a user's orders, oldest first.
    pub async fn list_orders(&self, user_id: &str) -> Result<Vec<Order>> {
        self.store.list_orders(user_id.trim()).await
    }

    /// Returns the current status of an order.
    pub async fn order_status(&self, id: OrderId) -> Result<OrderStatus> {
        self.store
            .get_order(id)
            .await?
            .map(|order| order.status)
            .ok_or(OrdersError::OrderNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryOrderStore;

    fn service() -> OrderService<InMemoryOrderStore> {
        OrderService::new(InMemoryOrderStore::new())
    }

    #[tokio::test]
    async fn created_order_is_new() {
        let service = service();
        let order = service
            .create_order("u1", Money::from_units(40), "book")
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(service.order_status(order.id).await.unwrap(), OrderStatus::New);
        assert_eq!(service.store().outbox_records().await.len(), 1);
    }

    #[tokio::test]
    async fn invalid_orders_are_rejected_without_side_effects() {
        let service = service();

        for (user, amount) in [("", 10), ("u1", 0), ("u1", -5)] {
            let err = service
                .create_order(user, Money::from_units(amount), "x")
                .await
                .unwrap_err();
            assert!(matches!(err, OrdersError::Validation(_)));
        }
        assert!(service.store().outbox_records().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_order_status_is_not_found() {
        let err = service().order_status(OrderId::new()).await.unwrap_err();
        assert!(matches!(err, OrdersError::OrderNotFound(_)));
    }
}
