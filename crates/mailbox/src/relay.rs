//! Outbox relay
//!
//! Moves committed outbox records to the broker. Delivery is at-least-once:
//! a record published but not yet marked processed (crash, failed update) is
//! published again on a later cycle, so consumers must be idempotent.

use std::sync::Arc;
use std::time::Duration;

use broker::MessageBroker;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::{OutboxStore, Result};

/// Relay tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Maximum records read per cycle
    pub batch_size: usize,
    /// Pause between cycles
    pub interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            interval: Duration::from_secs(2),
        }
    }
}

/// Publishes one outbox to one fanout destination.
///
/// A single relay per outbox keeps publish order equal to creation order.
pub struct Relay<S> {
    store: S,
    broker: Arc<dyn MessageBroker>,
    destination: String,
    config: RelayConfig,
}

impl<S: OutboxStore> Relay<S> {
    pub fn new(
        store: S,
        broker: Arc<dyn MessageBroker>,
        destination: impl Into<String>,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            broker,
            destination: destination.into(),
            config,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Runs a single cycle and returns the number of records published.
    ///
    /// Records are published in creation order. The first publish failure
    /// ends the cycle so later records never overtake an earlier one; the
    /// records published before it are still marked processed.
    #[instrument(skip(self), fields(destination = %self.destination))]
    pub async fn run_once(&self) -> Result<usize> {
        let batch = self.store.fetch_unprocessed(self.config.batch_size).await?;
        if batch.is_empty() {
            return Ok(0);
        }

        debug!(count = batch.len(), "Publishing outbox batch");

        let mut published = Vec::with_capacity(batch.len());
        for record in &batch {
            match self
                .broker
                .publish(&self.destination, record.content.clone().into_bytes())
                .await
            {
                Ok(()) => {
                    published.push(record.id);
                    metrics::counter!("relay_messages_published_total", "destination" => self.destination.clone())
                        .increment(1);
                }
                Err(e) => {
                    metrics::counter!("relay_publish_failures_total", "destination" => self.destination.clone())
                        .increment(1);
                    warn!(
                        message_id = %record.id,
                        message_type = %record.message_type,
                        error = %e,
                        "Publish failed, record left for next cycle"
                    );
                    break;
                }
            }
        }

        if !published.is_empty() {
            self.store.mark_processed(&published, Utc::now()).await?;
            info!(count = published.len(), "Outbox records published");
        }

        Ok(published.len())
    }

    /// Runs cycles until `shutdown` flips to true.
    ///
    /// A cycle in progress always finishes before the loop exits. Store errors
    /// are logged and retried on the next cycle.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            destination = %self.destination,
            batch_size = self.config.batch_size,
            interval_ms = self.config.interval.as_millis() as u64,
            "Relay started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.run_once().await {
                error!(destination = %self.destination, error = %e, "Relay cycle failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(destination = %self.destination, "Relay stopped");
    }
}
