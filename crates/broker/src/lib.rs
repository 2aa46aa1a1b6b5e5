//! Message broker abstraction for the marketplace services.
//!
//! The services talk to each other through *fanout destinations*: every
//! message published to a destination is copied into each durable, named
//! queue bound to it. Consumers pull deliveries from a queue and settle each
//! one explicitly, so a message that was never acknowledged is delivered
//! again.
//!
//! ## Implementations
//!
//! - **NatsBroker**: production implementation on NATS JetStream
//! - **InMemoryBroker**: test/dev implementation with the same queue semantics
//!
//! ## Usage
//!
//! ```rust,no_run
//! use broker::{InMemoryBroker, MessageBroker};
//! use futures_util::StreamExt;
//!
//! # async fn example() -> broker::Result<()> {
//! let broker = InMemoryBroker::new();
//! let mut deliveries = broker.subscribe("orders.payments", "payments.inbox").await?;
//!
//! broker.publish("orders.payments", b"{}".to_vec()).await?;
//!
//! if let Some(delivery) = deliveries.next().await {
//!     let delivery = delivery?;
//!     // ... apply the message ...
//!     delivery.ack().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod consumer;
pub mod error;
pub mod memory;
pub mod nats;
pub mod retry;

pub use consumer::{Consumer, Disposition, MessageHandler};
pub use error::{BrokerError, Result};
pub use memory::InMemoryBroker;
pub use nats::NatsBroker;
pub use retry::{RetryPolicy, connect_with_retry, retry_fixed};

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Settles a single delivery with the broker that produced it.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Removes the message from the queue.
    async fn ack(&self) -> Result<()>;

    /// Returns the message to the queue for redelivery.
    async fn nack(&self) -> Result<()>;
}

/// A message handed to a consumer, awaiting acknowledgement.
pub struct Delivery {
    /// Destination the message was published to.
    pub destination: String,
    /// Queue the message was consumed from.
    pub queue: String,
    /// Raw message body.
    pub payload: Vec<u8>,
    /// True if this message has been handed out before.
    pub redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        destination: impl Into<String>,
        queue: impl Into<String>,
        payload: Vec<u8>,
        redelivered: bool,
        acker: impl Acknowledger + 'static,
    ) -> Self {
        Self {
            destination: destination.into(),
            queue: queue.into(),
            payload,
            redelivered,
            acker: Box::new(acker),
        }
    }

    /// Acknowledges the delivery; the broker will not hand it out again.
    pub async fn ack(self) -> Result<()> {
        self.acker.ack().await
    }

    /// Rejects the delivery; the broker will hand it out again.
    pub async fn nack(self) -> Result<()> {
        self.acker.nack().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("destination", &self.destination)
            .field("queue", &self.queue)
            .field("payload_len", &self.payload.len())
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

/// A stream of deliveries from one durable queue.
pub type DeliveryStream = BoxStream<'static, Result<Delivery>>;

/// Core broker abstraction for fanout publish and durable queue consumption.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publishes a message to a fanout destination.
    ///
    /// Every queue bound to the destination receives its own copy.
    async fn publish(&self, destination: &str, payload: Vec<u8>) -> Result<()>;

    /// Declares a durable queue and binds it to a destination.
    ///
    /// Idempotent: declaring an existing queue leaves its contents untouched.
    async fn declare_queue(&self, destination: &str, queue: &str) -> Result<()>;

    /// Declares the queue (if needed) and starts consuming from it.
    ///
    /// Several subscriptions on the same queue compete for its messages.
    async fn subscribe(&self, destination: &str, queue: &str) -> Result<DeliveryStream>;
}

impl fmt::Debug for dyn MessageBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageBroker")
    }
}
