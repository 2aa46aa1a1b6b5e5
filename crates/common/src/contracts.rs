//! Messages exchanged between the orders and payments services.

use serde::{Deserialize, Serialize};

use crate::types::{Money, OrderId};

/// Type tags stored alongside mailbox records.
pub mod message_types {
    pub const ORDER_CREATED: &str = "OrderCreated";
    pub const PAYMENT_RESULT: &str = "PaymentResult";
}

/// Fanout destinations and the durable queues bound to them.
pub mod topology {
    /// Carries `OrderCreated` from the orders service.
    pub const ORDER_EVENTS: &str = "orders.payments";
    /// Durable queue the payments service consumes `OrderCreated` from.
    pub const PAYMENTS_INBOX_QUEUE: &str = "payments.inbox";

    /// Carries `PaymentResult` from the payments service.
    pub const PAYMENT_RESULTS: &str = "payments.orders";
    /// Durable queue the orders service consumes `PaymentResult` from.
    pub const ORDER_RESULTS_QUEUE: &str = "orders.paymentresults";
}

/// Published by the orders service whenever an order is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub id: OrderId,
    pub user_id: String,
    pub amount: Money,
}

impl OrderCreated {
    /// Business-event key used for inbox de-duplication.
    pub fn event_key(&self) -> String {
        self.id.to_string()
    }
}

/// Outcome of applying an order's payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Finished,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Finished => "FINISHED",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published by the payments service once per applied `OrderCreated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub id: OrderId,
    pub status: PaymentStatus,
}
