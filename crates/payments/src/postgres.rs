use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MessageId, Money, OrderCreated, PaymentResult, PaymentStatus, message_types};
use mailbox::{InboxInsert, InboxRecord, OutboxRecord, OutboxStore, PostgresOutbox};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::account::charge;
use crate::store::{PaymentOutcome, PaymentStore};
use crate::{Account, PaymentsError, Result};

/// PostgreSQL-backed payment store.
#[derive(Clone)]
pub struct PostgresPaymentStore {
    pool: PgPool,
    outbox: PostgresOutbox,
}

impl PostgresPaymentStore {
    /// Creates a new PostgreSQL payment store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            outbox: PostgresOutbox::new(pool.clone()),
            pool,
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Gets the outbox reader over the same pool.
    pub fn outbox(&self) -> &PostgresOutbox {
        &self.outbox
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_account(row: PgRow) -> Result<Account> {
        Ok(Account {
            id: row.try_get::<Uuid, _>("id")?,
            user_id: row.try_get("user_id")?,
            balance: Money::from_decimal(row.try_get::<Decimal, _>("balance")?),
        })
    }
}

#[async_trait]
impl OutboxStore for PostgresPaymentStore {
    async fn fetch_unprocessed(&self, limit: usize) -> mailbox::Result<Vec<OutboxRecord>> {
        self.outbox.fetch_unprocessed(limit).await
    }

    async fn mark_processed(&self, ids: &[MessageId], at: DateTime<Utc>) -> mailbox::Result<()> {
        self.outbox.mark_processed(ids, at).await
    }
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn create_account(&self, user_id: &str) -> Result<Account> {
        let account = Account::open(user_id);

        sqlx::query("INSERT INTO accounts (id, user_id, balance) VALUES ($1, $2, $3)")
            .bind(account.id)
            .bind(&account.user_id)
            .bind(account.balance.amount())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_account_user")
                {
                    return PaymentsError::AccountExists(user_id.to_string());
                }
                PaymentsError::Database(e)
            })?;

        Ok(account)
    }

    async fn deposit(&self, user_id: &str, amount: Money) -> Result<Account> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT id, user_id, balance
            FROM accounts
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(PaymentsError::AccountNotFound(user_id.to_string()));
        };
        let mut account = Self::row_to_account(row)?;

        // The sum is computed here so the stored balance always decodes as a Decimal.
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| PaymentsError::Validation("Deposit exceeds the maximum balance".into()))?;

        sqlx::query("UPDATE accounts SET balance = $2 WHERE id = $1")
            .bind(account.id)
            .bind(account.balance.amount())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(account)
    }

    async fn get_account(&self, user_id: &str) -> Result<Option<Account>> {
        let row = sqlx::query("SELECT id, user_id, balance FROM accounts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_account).transpose()
    }

    #[tracing::instrument(skip(self, raw), fields(order_id = %event.id))]
    async fn apply_order_payment(&self, event: &OrderCreated, raw: &str) -> Result<PaymentOutcome> {
        let mut tx = self.pool.begin().await?;

        // A concurrent delivery of the same event blocks on the unique index
        // until this transaction ends, then sees the conflict.
        let inbox = InboxRecord::received(message_types::ORDER_CREATED, event.event_key(), raw);
        if mailbox::postgres::record_inbox(&mut tx, &inbox).await? == InboxInsert::Duplicate {
            tx.rollback().await?;
            return Ok(PaymentOutcome::Duplicate);
        }

        let row = sqlx::query(
            "SELECT id, user_id, balance FROM accounts WHERE user_id = $1 FOR UPDATE",
        )
        .bind(&event.user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let mut account = row.map(Self::row_to_account).transpose()?;

        let status = charge(account.as_mut(), event.amount);
        if status == PaymentStatus::Finished
            && let Some(account) = &account
        {
            sqlx::query("UPDATE accounts SET balance = $2 WHERE id = $1")
                .bind(account.id)
                .bind(account.balance.amount())
                .execute(&mut *tx)
                .await?;
        }

        mailbox::postgres::mark_inbox_processed(&mut tx, inbox.id, Utc::now()).await?;

        let result = OutboxRecord::new(
            message_types::PAYMENT_RESULT,
            &PaymentResult {
                id: event.id,
                status,
            },
        )?;
        mailbox::postgres::enqueue(&mut tx, &result).await?;

        tx.commit().await?;
        Ok(PaymentOutcome::Applied(status))
    }
}
