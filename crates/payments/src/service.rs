//! Account operations with input validation.

use common::Money;

use crate::store::PaymentStore;
use crate::{Account, PaymentsError, Result};

/// Service for managing accounts.
#[derive(Clone)]
pub struct AccountService<S> {
    store: S,
}

impl<S: PaymentStore> AccountService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Opens an account with a zero balance.
    #[tracing::instrument(skip(self))]
    pub async fn create_account(&self, user_id: &str) -> Result<Account> {
        let user_id = validate_user_id(user_id)?;
        let account = self.store.create_account(user_id).await?;
        tracing::info!(user_id, account_id = %account.id, "Account created");
        Ok(account)
    }

    /// Adds a positive amount to an existing account.
    #[tracing::instrument(skip(self))]
    pub async fn deposit(&self, user_id: &str, amount: Money) -> Result<Account> {
        let user_id = validate_user_id(user_id)?;
        if !amount.is_positive() {
            return Err(PaymentsError::Validation(format!(
                "Deposit amount must be positive, got {amount}"
            )));
        }

        let account = self.store.deposit(user_id, amount).await?;
        tracing::info!(user_id, %amount, balance = %account.balance, "Deposit applied");
        Ok(account)
    }

    /// Returns the account for `user_id`.
    pub async fn balance(&self, user_id: &str) -> Result<Account> {
        let user_id = user_id.trim();
        self.store
            .get_account(user_id)
            .await?
            .ok_or_else(|| PaymentsError::AccountNotFound(user_id.to_string()))
    }
}

fn validate_user_id(user_id: &str) -> Result<&str> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(PaymentsError::Validation("userId is required".to_string()));
    }
    Ok(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryPaymentStore;

    fn service() -> AccountService<InMemoryPaymentStore> {
        AccountService::new(InMemoryPaymentStore::new())
    }

    #[tokio::test]
    async fn create_deposit_and_read_balance() {
        let service = service();
        let account = service.create_account("u1").await.unwrap();
        assert_eq!(account.balance, Money::zero());

        service.deposit("u1", Money::from_units(100)).await.unwrap();
        let account = service.balance("u1").await.unwrap();
        assert_eq!(account.balance, Money::from_units(100));
    }

    #[tokio::test]
    async fn blank_user_id_is_rejected() {
        let err = service().create_account("   ").await.unwrap_err();
        assert!(matches!(err, PaymentsError::Validation(_)));
    }

    #[tokio::test]
    async fn non_positive_deposit_is_rejected() {
        let service = service();
        service.create_account("u1").await.unwrap();

        for amount in [Money::zero(), Money::from_units(-10)] {
            let err = service.deposit("u1", amount).await.unwrap_err();
            assert!(matches!(err, PaymentsError::Validation(_)));
        }
        assert_eq!(service.balance("u1").await.unwrap().balance, Money::zero());
    }

    #[tokio::test]
    async fn unknown_account_balance_is_not_found() {
        let err = service().balance("ghost").await.unwrap_err();
        assert!(matches!(err, PaymentsError::AccountNotFound(_)));
    }
}
