
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an order.
///
/// Wraps a UUID to provide type safety and prevent mixing up
/// order IDs with other UUID-based identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Creates a new random order ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an order ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses the canonical hyphenated (or simple) UUID text form.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for OrderId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<OrderId> for Uuid {
    fn from(id: OrderId) -> Self {
        id.0
    }
}

/// Identity of a mailbox record (outbox or inbox row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monetary amount with exact decimal arithmetic.
///
/// Serialized as a plain JSON number (`40.5`), which is what the wire
/// contracts carry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::float")] Decimal);

impl Money {
    /// Creates a money amount from an exact decimal.
    pub fn from_decimal(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Creates a money amount from whole currency units.
    pub fn from_units(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns the exact decimal amount.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Subtracts `other`, returning `None` if the result would be negative.
    pub fn checked_debit(self, other: Money) -> Option<Money> {
        if self.0 >= other.0 {
            Some(Self(self.0 - other.0))
        } else {
            None
        }
    }

    /// Adds `other`, returning `None` if the sum is not representable.
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Self)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_id_new_creates_unique_ids() {
        let id1 = OrderId::new();
        let id2 = OrderId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn order_id_parse_accepts_canonical_form() {
        let uuid = Uuid::new_v4();
        let parsed = OrderId::parse(&uuid.to_string()).unwrap();
        assert_eq!(parsed.as_uuid(), uuid);
    }

    #[test]
    fn order_id_parse_rejects_garbage() {
        assert!(OrderId::parse("not-an-order").is_none());
        assert!(OrderId::parse("").is_none());
    }

    #[test]
    fn money_serializes_as_json_number() {
        let json = serde_json::to_value(Money::from_units(40)).unwrap();
        assert!(json.is_number());
        assert_eq!(json.as_f64(), Some(40.0));
    }

    #[test]
    fn money_deserializes_integers_and_fractions() {
        let whole: Money = serde_json::from_str("100").unwrap();
        assert_eq!(whole, Money::from_units(100));

        let fraction: Money = serde_json::from_str("12.5").unwrap();
        assert_eq!(fraction.amount(), Decimal::new(125, 1));
    }

    #[test]
    fn checked_debit_refuses_overdraft() {
        let balance = Money::from_units(100);
        assert_eq!(
            balance.checked_debit(Money::from_units(40)),
            Some(Money::from_units(60))
        );
        assert_eq!(balance.checked_debit(Money::from_units(100)), Some(Money::zero()));
        assert_eq!(balance.checked_debit(Money::from_units(101)), None);
    }

    #[test]
    fn checked_add_refuses_overflow() {
        let big = Money::from_decimal(Decimal::from_scientific("7e28").unwrap());
        assert_eq!(
            Money::from_units(2).checked_add(Money::from_units(3)),
            Some(Money::from_units(5))
        );
        assert!(big.checked_add(Money::from_units(1)).is_some());
        assert_eq!(big.checked_add(big), None);
        assert_eq!(
            Money::from_decimal(Decimal::MAX).checked_add(Money::from_units(1)),
            None
        );
    }
}
