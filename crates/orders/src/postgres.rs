use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MessageId, Money, OrderCreated, OrderId, message_types};
use mailbox::{OutboxRecord, OutboxStore, PostgresOutbox};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::store::{OrderStore, StatusChange};
use crate::{Order, OrderStatus, OrdersError, Result};

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
    outbox: PostgresOutbox,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            outbox: PostgresOutbox::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn outbox(&self) -> &PostgresOutbox {
        &self.outbox
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn parse_status(raw: &str) -> Result<OrderStatus> {
        raw.parse().map_err(OrdersError::CorruptRow)
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: row.try_get("user_id")?,
            amount: Money::from_decimal(row.try_get::<Decimal, _>("amount")?),
            description: row.try_get("description")?,
            status: Self::parse_status(&status)?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl OutboxStore for PostgresOrderStore {
    async fn fetch_unprocessed(&self, limit: usize) -> mailbox::Result<Vec<OutboxRecord>> {
        self.outbox.fetch_unprocessed(limit).await
    }

    async fn mark_processed(&self, ids: &[MessageId], at: DateTime<Utc>) -> mailbox::Result<()> {
        self.outbox.mark_processed(ids, at).await
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create_order(&self, order: &Order) -> Result<()> {
        let record = OutboxRecord::new(
            message_types::ORDER_CREATED,
            &OrderCreated {
                id: order.id,
                user_id: order.user_id.clone(),
                amount: order.amount,
            },
        )?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, amount, description, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.user_id)
        .bind(order.amount.amount())
        .bind(&order.description)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        mailbox::postgres::enqueue(&mut tx, &record).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_orders(&self, user_id: &str) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, amount, description, status, created_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT id, user_id, amount, description, status, created_at FROM orders WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    #[tracing::instrument(skip(self), fields(order_id = %id))]
    async fn apply_status(&self, id: OrderId, status: OrderStatus) -> Result<StatusChange> {
        if !status.is_terminal() {
            return match self.get_order(id).await? {
                Some(order) => Ok(StatusChange::Unchanged(order.status)),
                None => Ok(StatusChange::NotFound),
            };
        }

        let updated = sqlx::query(
            "UPDATE orders SET status = $2 WHERE id = $1 AND status = 'New' RETURNING status",
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if updated.is_some() {
            return Ok(StatusChange::Changed(status));
        }

        let current: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match current {
            Some(raw) => Ok(StatusChange::Unchanged(Self::parse_status(&raw)?)),
            None => Ok(StatusChange::NotFound),
        }
    }
}
