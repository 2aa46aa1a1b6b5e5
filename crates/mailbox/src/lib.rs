//! Durable mailbox for the transactional outbox and idempotent inbox.
//!
//! A service writes an [`OutboxRecord`] in the same unit of work as the state
//! change it announces; the [`Relay`] later publishes it. Inbound messages are
//! recorded as [`InboxRecord`]s keyed by their business-event id, so a
//! redelivered message is recognised and not applied twice.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod relay;
pub mod store;

pub use error::{MailboxError, Result};
pub use memory::{InMemoryOutbox, MailboxTables};
pub use postgres::PostgresOutbox;
pub use record::{InboxInsert, InboxRecord, OutboxRecord};
pub use relay::{Relay, RelayConfig};
pub use store::OutboxStore;
