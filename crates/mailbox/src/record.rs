use chrono::{DateTime, Utc};
use common::MessageId;
use serde::Serialize;

use crate::Result;

/// A message waiting to be published, written in the same unit of work as
/// the state change it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxRecord {
    pub id: MessageId,
    pub occurred_on: DateTime<Utc>,
    pub message_type: String,
    /// Serialized JSON payload, published verbatim.
    pub content: String,
    pub processed: bool,
    pub processed_on: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    /// Creates an unprocessed record carrying `payload` serialized as JSON.
    pub fn new<T: Serialize>(message_type: impl Into<String>, payload: &T) -> Result<Self> {
        Ok(Self {
            id: MessageId::new(),
            occurred_on: Utc::now(),
            message_type: message_type.into(),
            content: serde_json::to_string(payload)?,
            processed: false,
            processed_on: None,
        })
    }

    pub(crate) fn mark_processed(&mut self, at: DateTime<Utc>) {
        self.processed = true;
        self.processed_on = Some(at);
    }
}

/// One attempt to apply an inbound message.
///
/// `(message_type, event_key)` is unique across the inbox; a second record
/// for the same key means the message was seen before.
#[derive(Debug, Clone, PartialEq)]
pub struct InboxRecord {
    pub id: MessageId,
    pub received_on: DateTime<Utc>,
    pub message_type: String,
    /// Business-event id embedded in the message.
    pub event_key: String,
    /// Raw payload as received.
    pub content: String,
    pub processed: bool,
    pub processed_on: Option<DateTime<Utc>>,
}

impl InboxRecord {
    /// Creates an unprocessed record for a message received now.
    pub fn received(
        message_type: impl Into<String>,
        event_key: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            received_on: Utc::now(),
            message_type: message_type.into(),
            event_key: event_key.into(),
            content: content.into(),
            processed: false,
            processed_on: None,
        }
    }

    pub(crate) fn mark_processed(&mut self, at: DateTime<Utc>) {
        self.processed = true;
        self.processed_on = Some(at);
    }
}

/// Result of recording an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxInsert {
    /// First time this event key was seen.
    Recorded,
    /// A record with the same `(message_type, event_key)` already exists.
    Duplicate,
}
