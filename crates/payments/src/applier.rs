//! Effect applier: consumes `OrderCreated` and charges the account exactly once.
//!
//! Deliveries are acknowledged only after the store committed, so a crash
//! mid-way leads to redelivery, and redelivery of a committed message is
//! caught by the inbox.

use std::sync::Arc;

use async_trait::async_trait;
use broker::{Consumer, Disposition, MessageBroker, MessageHandler};
use common::{OrderCreated, topology};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::store::{PaymentOutcome, PaymentStore};

/// Applies `OrderCreated` messages to a [`PaymentStore`].
#[derive(Clone)]
pub struct EffectApplier<S> {
    store: S,
}

impl<S: PaymentStore> EffectApplier<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: PaymentStore> MessageHandler for EffectApplier<S> {
    async fn handle(&self, payload: &[u8], redelivered: bool) -> Disposition {
        let raw = match std::str::from_utf8(payload) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Dropping OrderCreated that is not UTF-8");
                return Disposition::Poison;
            }
        };

        let event: OrderCreated = match serde_json::from_str(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, payload = raw, "Dropping malformed OrderCreated");
                return Disposition::Poison;
            }
        };

        match self.store.apply_order_payment(&event, raw).await {
            Ok(PaymentOutcome::Applied(status)) => {
                metrics::counter!("payments_inbox_applied_total", "outcome" => status.as_str())
                    .increment(1);
                info!(
                    order_id = %event.id,
                    user_id = %event.user_id,
                    amount = %event.amount,
                    %status,
                    "Order payment applied"
                );
                Disposition::Ack
            }
            Ok(PaymentOutcome::Duplicate) => {
                metrics::counter!("payments_inbox_duplicates_total").increment(1);
                info!(order_id = %event.id, redelivered, "Order payment already applied, skipping");
                Disposition::Ack
            }
            Err(e) => {
                error!(order_id = %event.id, error = %e, "Failed to apply order payment");
                Disposition::Retry
            }
        }
    }
}

/// Consumes the payments inbox queue until `shutdown` flips to true.
pub async fn run_effect_applier<S>(
    store: S,
    broker: Arc<dyn MessageBroker>,
    shutdown: watch::Receiver<bool>,
) -> broker::Result<()>
where
    S: PaymentStore + 'static,
{
    Consumer::new(broker, topology::ORDER_EVENTS, topology::PAYMENTS_INBOX_QUEUE)
        .run(EffectApplier::new(store), shutdown)
        .await
}
