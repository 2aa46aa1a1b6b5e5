use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::MessageId;

use crate::{OutboxRecord, Result};

/// Read side of an outbox, as needed by the relay.
///
/// Writing records is not part of this trait: records are only ever written
/// together with a domain change, inside the owning service's unit of work.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Returns up to `limit` unprocessed records, oldest first.
    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<OutboxRecord>>;

    /// Flags the given records as processed at `at`.
    ///
    /// Unknown ids and already processed records are ignored.
    async fn mark_processed(&self, ids: &[MessageId], at: DateTime<Utc>) -> Result<()>;
}
