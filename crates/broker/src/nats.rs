//! NATS JetStream implementation of the MessageBroker trait

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::{self, AckKind, consumer, stream};
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;

use crate::{Acknowledger, BrokerError, Delivery, DeliveryStream, MessageBroker, Result};

/// MessageBroker implementation using NATS JetStream
///
/// Topology mapping:
/// - a fanout destination is a JetStream stream whose only subject is the
///   destination name
/// - a durable queue is a durable pull consumer on that stream with explicit
///   acknowledgement, so every queue sees every message
///
/// Streams use limits retention, so a queue declared after messages were
/// published still receives them.
#[derive(Clone)]
pub struct NatsBroker {
    context: jetstream::Context,
    ack_wait: Duration,
    declared_streams: Arc<Mutex<HashSet<String>>>,
}

impl NatsBroker {
    /// Create a new NatsBroker from an already-connected client.
    pub fn new(client: async_nats::Client) -> Self {
        Self {
            context: jetstream::new(client),
            ack_wait: Duration::from_secs(30),
            declared_streams: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Connect to a NATS server in a single attempt.
    ///
    /// Use [`crate::connect_with_retry`] around this at process startup.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        Ok(Self::new(client))
    }

    /// How long JetStream waits for an ack before redelivering.
    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }

    fn stream_name(destination: &str) -> String {
        destination.replace(['.', ' ', '*', '>'], "_").to_uppercase()
    }

    fn consumer_name(queue: &str) -> String {
        queue.replace(['.', ' ', '*', '>'], "-")
    }

    async fn ensure_stream(&self, destination: &str) -> Result<stream::Stream> {
        let name = Self::stream_name(destination);
        let stream = self
            .context
            .get_or_create_stream(stream::Config {
                name: name.clone(),
                subjects: vec![destination.to_string()],
                ..Default::default()
            })
            .await
            .map_err(|e| BrokerError::Subscribe {
                queue: destination.to_string(),
                reason: e.to_string(),
            })?;

        if self.declared_streams.lock().insert(name.clone()) {
            tracing::info!(destination, stream = %name, "JetStream stream ready");
        }
        Ok(stream)
    }

    async fn ensure_consumer(
        &self,
        destination: &str,
        queue: &str,
    ) -> Result<consumer::Consumer<consumer::pull::Config>> {
        let stream = self.ensure_stream(destination).await?;
        let durable = Self::consumer_name(queue);

        stream
            .get_or_create_consumer(
                &durable,
                consumer::pull::Config {
                    durable_name: Some(durable.clone()),
                    deliver_policy: consumer::DeliverPolicy::All,
                    ack_policy: consumer::AckPolicy::Explicit,
                    ack_wait: self.ack_wait,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BrokerError::Subscribe {
                queue: queue.to_string(),
                reason: e.to_string(),
            })
    }
}

struct NatsAcker {
    message: jetstream::Message,
}

#[async_trait]
impl Acknowledger for NatsAcker {
    async fn ack(&self) -> Result<()> {
        self.message
            .ack()
            .await
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }

    async fn nack(&self) -> Result<()> {
        self.message
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }
}

#[async_trait]
impl MessageBroker for NatsBroker {
    async fn publish(&self, destination: &str, payload: Vec<u8>) -> Result<()> {
        let known = self
            .declared_streams
            .lock()
            .contains(&Self::stream_name(destination));
        if !known {
            self.ensure_stream(destination).await?;
        }

        let publish_error = |reason: String| BrokerError::Publish {
            destination: destination.to_string(),
            reason,
        };

        self.context
            .publish(destination.to_string(), payload.into())
            .await
            .map_err(|e| publish_error(e.to_string()))?
            .await
            .map_err(|e| publish_error(e.to_string()))?;

        Ok(())
    }

    async fn declare_queue(&self, destination: &str, queue: &str) -> Result<()> {
        self.ensure_consumer(destination, queue).await?;
        Ok(())
    }

    async fn subscribe(&self, destination: &str, queue: &str) -> Result<DeliveryStream> {
        let consumer = self.ensure_consumer(destination, queue).await?;
        let messages = consumer
            .messages()
            .await
            .map_err(|e| BrokerError::Subscribe {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;

        let destination = destination.to_string();
        let queue = queue.to_string();
        let stream = messages.map(move |result| match result {
            Ok(message) => {
                let redelivered = message.info().map(|i| i.delivered > 1).unwrap_or(false);
                let payload = message.payload.to_vec();
                Ok(Delivery::new(
                    destination.clone(),
                    queue.clone(),
                    payload,
                    redelivered,
                    NatsAcker { message },
                ))
            }
            Err(e) => Err(BrokerError::Receive(e.to_string())),
        });

        Ok(stream.boxed())
    }
}
