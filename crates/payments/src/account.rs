use common::{Money, PaymentStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's account. One per user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub user_id: String,
    pub balance: Money,
}

impl Account {
    /// Opens an empty account for `user_id`.
    pub fn open(user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            balance: Money::zero(),
        }
    }
}

/// Charges an order of `amount` to `account`.
///
/// Debits the account and returns `Finished` when it exists and covers the
/// amount; otherwise leaves it untouched and returns `Cancelled`. A
/// non-positive amount is never charged.
pub fn charge(account: Option<&mut Account>, amount: Money) -> PaymentStatus {
    let Some(account) = account else {
        return PaymentStatus::Cancelled;
    };
    if !amount.is_positive() {
        return PaymentStatus::Cancelled;
    }

    match account.balance.checked_debit(amount) {
        Some(remaining) => {
            account.balance = remaining;
            PaymentStatus::Finished
        }
        None => PaymentStatus::Cancelled,
    }
}
