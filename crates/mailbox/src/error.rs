use thiserror::Error;

/// Errors that can occur when reading or writing mailbox records.
#[derive(Debug, Error)]
pub enum MailboxError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker rejected a publish.
    #[error("Broker error: {0}")]
    Broker(#[from] broker::BrokerError),
}

/// Result type for mailbox operations.
pub type Result<T> = std::result::Result<T, MailboxError>;
