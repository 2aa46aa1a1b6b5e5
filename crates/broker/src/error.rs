use thiserror::Error;

/// Errors that can occur when talking to the message broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// A single connection attempt failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Every connection attempt failed; the caller must not continue without a broker.
    #[error("Could not connect to {target} after {attempts} attempts: {last_error}")]
    ConnectionExhausted {
        target: String,
        attempts: u32,
        last_error: String,
    },

    /// Publishing a message failed.
    #[error("Publish to '{destination}' failed: {reason}")]
    Publish { destination: String, reason: String },

    /// Declaring or subscribing to a queue failed.
    #[error("Subscribe to '{queue}' failed: {reason}")]
    Subscribe { queue: String, reason: String },

    /// A delivery could not be settled.
    #[error("Acknowledgement failed: {0}")]
    Ack(String),

    /// Receiving the next delivery failed.
    #[error("Receive error: {0}")]
    Receive(String),

    /// The broker closed a subscription that should run until shutdown.
    #[error("Delivery stream for '{queue}' ended")]
    StreamEnded { queue: String },
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
