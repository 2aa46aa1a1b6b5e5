//! Order and its status state machine.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentStatus};
use serde::{Deserialize, Serialize};

/// The status of an order.
///
/// State transitions:
/// ```text
/// New ──┬──► Finished
///       └──► Cancelled
/// ```
/// Both outcomes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Created, payment not yet settled.
    #[default]
    New,

    /// Paid (terminal state).
    Finished,

    /// Payment refused (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Finished | OrderStatus::Cancelled)
    }

    /// Returns true if moving from `self` to `next` is allowed and changes something.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        !self.is_terminal() && next.is_terminal()
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "New",
            OrderStatus::Finished => "Finished",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "New" => Ok(OrderStatus::New),
            "Finished" => Ok(OrderStatus::Finished),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

impl From<PaymentStatus> for OrderStatus {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Finished => OrderStatus::Finished,
            PaymentStatus::Cancelled => OrderStatus::Cancelled,
        }
    }
}

/// An order placed by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: String,
    pub amount: Money,
    pub description: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new order in the `New` status.
    pub fn new(user_id: impl Into<String>, amount: Money, description: impl Into<String>) -> Self {
        Self {
            id: OrderId::new(),
            user_id: user_id.into(),
            amount,
            description: description.into(),
            status: OrderStatus::New,
            created_at: Utc::now(),
        }
    }

    /// Moves the order to `next` if allowed. Returns true if the status changed.
    pub fn transition(&mut self, next: OrderStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}
