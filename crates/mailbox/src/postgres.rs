//! PostgreSQL persistence for mailbox records
//!
//! The free functions take a connection so callers can run them inside the
//! same transaction as their domain writes:
//!
//! ```rust,ignore
//! let mut tx = pool.begin().await?;
//! sqlx::query("INSERT INTO orders ...").execute(&mut *tx).await?;
//! mailbox::postgres::enqueue(&mut tx, &record).await?;
//! tx.commit().await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::MessageId;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{InboxInsert, InboxRecord, OutboxRecord, OutboxStore, Result};

/// Writes an outbox record.
pub async fn enqueue(conn: &mut PgConnection, record: &OutboxRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO outbox_messages (id, occurred_on, message_type, content, processed, processed_on)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(record.id.as_uuid())
    .bind(record.occurred_on)
    .bind(&record.message_type)
    .bind(&record.content)
    .bind(record.processed)
    .bind(record.processed_on)
    .execute(conn)
    .await?;

    Ok(())
}

/// Writes an inbox record, relying on the unique
/// `(message_type, event_key)` index to detect a message seen before.
pub async fn record_inbox(conn: &mut PgConnection, record: &InboxRecord) -> Result<InboxInsert> {
    let result = sqlx::query(
        r#"
        INSERT INTO inbox_messages (id, received_on, message_type, event_key, content, processed, processed_on)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (message_type, event_key) DO NOTHING
        "#,
    )
    .bind(record.id.as_uuid())
    .bind(record.received_on)
    .bind(&record.message_type)
    .bind(&record.event_key)
    .bind(&record.content)
    .bind(record.processed)
    .bind(record.processed_on)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        Ok(InboxInsert::Duplicate)
    } else {
        Ok(InboxInsert::Recorded)
    }
}

pub async fn mark_inbox_processed(
    conn: &mut PgConnection,
    id: MessageId,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE inbox_messages SET processed = TRUE, processed_on = $2 WHERE id = $1")
        .bind(id.as_uuid())
        .bind(at)
        .execute(conn)
        .await?;
    Ok(())
}

/// Reads every inbox record, oldest first.
pub async fn inbox_records(pool: &PgPool) -> Result<Vec<InboxRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, received_on, message_type, event_key, content, processed, processed_on
        FROM inbox_messages
        ORDER BY received_on ASC, id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(InboxRecord {
                id: MessageId::from_uuid(row.try_get::<Uuid, _>("id")?),
                received_on: row.try_get("received_on")?,
                message_type: row.try_get("message_type")?,
                event_key: row.try_get("event_key")?,
                content: row.try_get("content")?,
                processed: row.try_get("processed")?,
                processed_on: row.try_get("processed_on")?,
            })
        })
        .collect()
}

/// PostgreSQL-backed outbox reader for the relay.
#[derive(Clone)]
pub struct PostgresOutbox {
    pool: PgPool,
}

impl PostgresOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Reads every outbox record, oldest first.
    pub async fn records(&self) -> Result<Vec<OutboxRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, occurred_on, message_type, content, processed, processed_on
            FROM outbox_messages
            ORDER BY occurred_on ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    fn row_to_record(row: PgRow) -> Result<OutboxRecord> {
        Ok(OutboxRecord {
            id: MessageId::from_uuid(row.try_get::<Uuid, _>("id")?),
            occurred_on: row.try_get("occurred_on")?,
            message_type: row.try_get("message_type")?,
            content: row.try_get("content")?,
            processed: row.try_get("processed")?,
            processed_on: row.try_get("processed_on")?,
        })
    }
}

#[async_trait]
impl OutboxStore for PostgresOutbox {
    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<OutboxRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, occurred_on, message_type, content, processed, processed_on
            FROM outbox_messages
            WHERE processed = FALSE
            ORDER BY occurred_on ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn mark_processed(&self, ids: &[MessageId], at: DateTime<Utc>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        sqlx::query(
            r#"
            UPDATE outbox_messages
            SET processed = TRUE, processed_on = $2
            WHERE id = ANY($1) AND processed = FALSE
            "#,
        )
        .bind(&ids)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
