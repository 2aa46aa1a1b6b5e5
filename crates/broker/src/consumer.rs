//! Long-running queue consumer
//!
//! Pulls deliveries from one durable queue, hands each payload to a
//! [`MessageHandler`] and settles the delivery according to the handler's
//! verdict. Processing of a delivery always completes before a shutdown
//! request is honoured.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{BrokerError, MessageBroker, Result};

/// What to do with a delivery once the handler is done with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed (or nothing to do): acknowledge.
    Ack,
    /// Cannot ever be processed: acknowledge and drop.
    Poison,
    /// Transient failure: leave it for redelivery.
    Retry,
}

/// Processes the payload of one delivery.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8], redelivered: bool) -> Disposition;
}

/// Consumer bound to one destination and durable queue.
pub struct Consumer {
    broker: Arc<dyn MessageBroker>,
    destination: String,
    queue: String,
    retry_delay: Duration,
}

impl Consumer {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        destination: impl Into<String>,
        queue: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            destination: destination.into(),
            queue: queue.into(),
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Pause after a delivery was returned for redelivery or a receive failed.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Consumes until `shutdown` flips to true.
    ///
    /// Fails if the queue cannot be subscribed to or the broker ends the
    /// delivery stream first.
    pub async fn run<H: MessageHandler>(
        self,
        handler: H,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut deliveries = self.broker.subscribe(&self.destination, &self.queue).await?;
        info!(destination = %self.destination, queue = %self.queue, "Consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let next = tokio::select! {
                next = deliveries.next() => next,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    warn!(queue = %self.queue, error = %e, "Error receiving delivery");
                    tokio::select! {
                        _ = tokio::time::sleep(self.retry_delay) => {}
                        _ = shutdown.changed() => {}
                    }
                    continue;
                }
                None => {
                    error!(queue = %self.queue, "Delivery stream ended");
                    return Err(BrokerError::StreamEnded {
                        queue: self.queue.clone(),
                    });
                }
            };

            let disposition = handler.handle(&delivery.payload, delivery.redelivered).await;
            debug!(queue = %self.queue, ?disposition, redelivered = delivery.redelivered, "Delivery handled");

            let settled = match disposition {
                Disposition::Ack => delivery.ack().await,
                Disposition::Poison => {
                    metrics::counter!("consumer_poison_messages_total", "queue" => self.queue.clone())
                        .increment(1);
                    delivery.ack().await
                }
                Disposition::Retry => {
                    let result = delivery.nack().await;
                    tokio::select! {
                        _ = tokio::time::sleep(self.retry_delay) => {}
                        _ = shutdown.changed() => {}
                    }
                    result
                }
            };

            if let Err(e) = settled {
                error!(queue = %self.queue, error = %e, "Failed to settle delivery");
            }
        }

        info!(queue = %self.queue, "Consumer stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Delivery, DeliveryStream, InMemoryBroker};
    use parking_lot::Mutex;

    /// Records payloads and answers from a script, then acks.
    #[derive(Clone, Default)]
    struct Scripted {
        seen: Arc<Mutex<Vec<(String, bool)>>>,
        script: Arc<Mutex<Vec<Disposition>>>,
    }

    #[async_trait]
    impl MessageHandler for Scripted {
        async fn handle(&self, payload: &[u8], redelivered: bool) -> Disposition {
            self.seen
                .lock()
                .push((String::from_utf8_lossy(payload).into_owned(), redelivered));
            let mut script = self.script.lock();
            if script.is_empty() {
                Disposition::Ack
            } else {
                script.remove(0)
            }
        }
    }

    /// Broker whose subscriptions fail to receive a few times and then end.
    struct Failing {
        receive_errors: usize,
        refuse_subscribe: bool,
    }

    #[async_trait]
    impl MessageBroker for Failing {
        async fn publish(&self, _destination: &str, _payload: Vec<u8>) -> Result<()> {
            Ok(())
        }

        async fn declare_queue(&self, _destination: &str, _queue: &str) -> Result<()> {
            Ok(())
        }

        async fn subscribe(&self, _destination: &str, queue: &str) -> Result<DeliveryStream> {
            if self.refuse_subscribe {
                return Err(BrokerError::Subscribe {
                    queue: queue.to_string(),
                    reason: "refused".to_string(),
                });
            }
            let errors = (0..self.receive_errors)
                .map(|i| -> Result<Delivery> { Err(BrokerError::Receive(format!("receive failure {i}"))) });
            Ok(futures_util::stream::iter(errors).boxed())
        }
    }

    async fn wait_for(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn retry_redelivers_and_poison_is_dropped() {
        let broker = InMemoryBroker::new();
        let handler = Scripted::default();
        *handler.script.lock() = vec![Disposition::Retry, Disposition::Ack, Disposition::Poison];

        broker.declare_queue("dest", "queue").await.unwrap();
        let (tx, rx) = watch::channel(false);
        let consumer = Consumer::new(Arc::new(broker.clone()), "dest", "queue")
            .with_retry_delay(Duration::from_millis(1));
        let task = tokio::spawn(consumer.run(handler.clone(), rx));

        broker.publish("dest", b"first".to_vec()).await.unwrap();
        broker.publish("dest", b"bad".to_vec()).await.unwrap();

        wait_for(|| handler.seen.lock().len() == 3).await;
        let seen = handler.seen.lock().clone();
        assert_eq!(seen[0], ("first".to_string(), false));
        assert_eq!(seen[1], ("first".to_string(), true));
        assert_eq!(seen[2], ("bad".to_string(), false));

        wait_for(|| broker.in_flight_count("queue") == 0).await;
        assert_eq!(broker.pending_count("queue"), 0);

        tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stops_on_shutdown_while_idle() {
        let broker = InMemoryBroker::new();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(
            Consumer::new(Arc::new(broker), "dest", "queue").run(Scripted::default(), rx),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("consumer did not stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn refused_subscription_fails_run() {
        let broker = Failing {
            receive_errors: 0,
            refuse_subscribe: true,
        };
        let (_tx, rx) = watch::channel(false);

        let err = Consumer::new(Arc::new(broker), "dest", "queue")
            .run(Scripted::default(), rx)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Subscribe { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn receive_errors_pause_and_stream_end_fails_run() {
        let broker = Failing {
            receive_errors: 3,
            refuse_subscribe: false,
        };
        let handler = Scripted::default();
        let (_tx, rx) = watch::channel(false);
        let started = tokio::time::Instant::now();

        let err = Consumer::new(Arc::new(broker), "dest", "queue")
            .with_retry_delay(Duration::from_secs(1))
            .run(handler.clone(), rx)
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::StreamEnded { ref queue } if queue == "queue"));
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(handler.seen.lock().is_empty());
    }
}
