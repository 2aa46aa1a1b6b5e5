//! Result listener: applies `PaymentResult` messages to orders.

use std::sync::Arc;

use async_trait::async_trait;
use broker::{Consumer, Disposition, MessageBroker, MessageHandler};
use common::{PaymentResult, topology};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::notifier::OrderNotifier;
use crate::store::{OrderStore, StatusChange};
use crate::OrderStatus;

/// Moves orders to their payment outcome and notifies live subscribers.
///
/// Subscribers are notified only when the stored status actually changed,
/// so redelivered results produce no second event.
#[derive(Clone)]
pub struct ResultListener<S> {
    store: S,
    notifier: OrderNotifier,
}

impl<S: OrderStore> ResultListener<S> {
    pub fn new(store: S, notifier: OrderNotifier) -> Self {
        Self { store, notifier }
    }
}

#[async_trait]
impl<S: OrderStore> MessageHandler for ResultListener<S> {
    async fn handle(&self, payload: &[u8], redelivered: bool) -> Disposition {
        let result: PaymentResult = match serde_json::from_slice(payload) {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "Dropping malformed PaymentResult"
                );
                return Disposition::Poison;
            }
        };

        let status = OrderStatus::from(result.status);
        match self.store.apply_status(result.id, status).await {
            Ok(StatusChange::Changed(status)) => {
                metrics::counter!("orders_status_transitions_total", "status" => status.as_str())
                    .increment(1);
                let notified = self.notifier.notify(result.id, status);
                info!(order_id = %result.id, %status, notified, "Order status updated");
                Disposition::Ack
            }
            Ok(StatusChange::Unchanged(current)) => {
                info!(
                    order_id = %result.id,
                    %current,
                    requested = %status,
                    redelivered,
                    "Order already settled, skipping"
                );
                Disposition::Ack
            }
            Ok(StatusChange::NotFound) => {
                warn!(order_id = %result.id, "PaymentResult for unknown order, dropping");
                Disposition::Ack
            }
            Err(e) => {
                error!(order_id = %result.id, error = %e, "Failed to apply payment result");
                Disposition::Retry
            }
        }
    }
}

/// Consumes the payment results queue until `shutdown` flips to true.
pub async fn run_result_listener<S>(
    store: S,
    notifier: OrderNotifier,
    broker: Arc<dyn MessageBroker>,
    shutdown: watch::Receiver<bool>,
) -> broker::Result<()>
where
    S: OrderStore + 'static,
{
    Consumer::new(broker, topology::PAYMENT_RESULTS, topology::ORDER_RESULTS_QUEUE)
        .run(ResultListener::new(store, notifier), shutdown)
        .await
}
