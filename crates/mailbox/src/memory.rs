use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::MessageId;
use tokio::sync::RwLock;

use crate::{InboxInsert, InboxRecord, OutboxRecord, OutboxStore, Result};

/// In-memory outbox and inbox tables.
///
/// Holds no lock of its own: in-memory service stores embed it next to their
/// domain state so a domain change and its mailbox record are written under
/// one lock, which is what a database transaction gives the Postgres stores.
#[derive(Debug, Clone, Default)]
pub struct MailboxTables {
    outbox: Vec<OutboxRecord>,
    inbox: Vec<InboxRecord>,
}

impl MailboxTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record to the outbox.
    pub fn enqueue(&mut self, record: OutboxRecord) {
        self.outbox.push(record);
    }

    /// Returns up to `limit` unprocessed outbox records in insertion order.
    pub fn unprocessed(&self, limit: usize) -> Vec<OutboxRecord> {
        self.outbox
            .iter()
            .filter(|r| !r.processed)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn mark_processed(&mut self, ids: &[MessageId], at: DateTime<Utc>) {
        let ids: HashSet<&MessageId> = ids.iter().collect();
        for record in self.outbox.iter_mut() {
            if !record.processed && ids.contains(&record.id) {
                record.mark_processed(at);
            }
        }
    }

    /// Returns true if an inbox record with this key exists.
    pub fn has_inbox(&self, message_type: &str, event_key: &str) -> bool {
        self.inbox
            .iter()
            .any(|r| r.message_type == message_type && r.event_key == event_key)
    }

    /// Inserts an inbox record unless one with the same key exists.
    pub fn record_inbox(&mut self, record: InboxRecord) -> InboxInsert {
        if self.has_inbox(&record.message_type, &record.event_key) {
            return InboxInsert::Duplicate;
        }
        self.inbox.push(record);
        InboxInsert::Recorded
    }

    pub fn mark_inbox_processed(&mut self, id: MessageId, at: DateTime<Utc>) {
        if let Some(record) = self.inbox.iter_mut().find(|r| r.id == id) {
            record.mark_processed(at);
        }
    }

    pub fn outbox(&self) -> &[OutboxRecord] {
        &self.outbox
    }

    pub fn inbox(&self) -> &[InboxRecord] {
        &self.inbox
    }
}

/// Standalone in-memory outbox.
///
/// Service stores implement [`OutboxStore`] over their own embedded tables;
/// this type is for exercising the relay on its own.
#[derive(Clone, Default)]
pub struct InMemoryOutbox {
    tables: Arc<RwLock<MailboxTables>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, record: OutboxRecord) {
        self.tables.write().await.enqueue(record);
    }

    /// Returns a copy of every outbox record.
    pub async fn records(&self) -> Vec<OutboxRecord> {
        self.tables.read().await.outbox().to_vec()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutbox {
    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<OutboxRecord>> {
        Ok(self.tables.read().await.unprocessed(limit))
    }

    async fn mark_processed(&self, ids: &[MessageId], at: DateTime<Utc>) -> Result<()> {
        self.tables.write().await.mark_processed(ids, at);
        Ok(())
    }
}
