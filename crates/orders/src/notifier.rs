//! Notification fan-out: live WebSocket subscriptions keyed by order id.
//!
//! Each connection owns a bounded channel. [`OrderNotifier::notify`] clones
//! the senders for one order out of the registry and releases the shard lock
//! before sending, and sends with `try_send`, so a slow client only loses its
//! own events and never holds up the result listener or other clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use common::OrderId;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::OrderStatus;

/// Per-connection buffer of undelivered events.
pub const CONNECTION_BUFFER: usize = 16;

pub type ConnectionId = u64;

/// Event pushed to subscribers when an order changes status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

#[derive(Default)]
struct Registry {
    subscribers: DashMap<OrderId, HashMap<ConnectionId, mpsc::Sender<String>>>,
    next_id: AtomicU64,
}

/// Registry of connections interested in order status changes.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone, Default)]
pub struct OrderNotifier {
    inner: Arc<Registry>,
}

impl OrderNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection for `order_id`.
    ///
    /// The returned [`Subscription`] unregisters itself when dropped.
    pub fn subscribe(&self, order_id: OrderId) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);

        self.inner
            .subscribers
            .entry(order_id)
            .or_default()
            .insert(id, tx);
        debug!(%order_id, connection_id = id, "Subscriber registered");

        Subscription {
            order_id,
            id,
            rx,
            notifier: self.clone(),
        }
    }

    /// Removes one connection. Empty order entries are dropped.
    pub fn unsubscribe(&self, order_id: OrderId, id: ConnectionId) {
        if let Some(mut connections) = self.inner.subscribers.get_mut(&order_id) {
            connections.remove(&id);
        }
        self.inner
            .subscribers
            .remove_if(&order_id, |_, connections| connections.is_empty());
        debug!(%order_id, connection_id = id, "Subscriber removed");
    }

    /// Pushes `{orderId, status}` to every connection subscribed to `order_id`.
    ///
    /// Returns the number of connections the event was queued for. Closed
    /// connections are pruned; full ones skip this event.
    pub fn notify(&self, order_id: OrderId, status: OrderStatus) -> usize {
        let targets: Vec<(ConnectionId, mpsc::Sender<String>)> =
            match self.inner.subscribers.get(&order_id) {
                Some(connections) => connections
                    .iter()
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect(),
                None => return 0,
            };

        let message = match serde_json::to_string(&StatusEvent { order_id, status }) {
            Ok(message) => message,
            Err(e) => {
                warn!(%order_id, error = %e, "Failed to encode status event");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    metrics::counter!("notifications_dropped_total").increment(1);
                    warn!(%order_id, connection_id = id, "Subscriber buffer full, event dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    metrics::counter!("notifications_dropped_total").increment(1);
                    debug!(%order_id, connection_id = id, "Subscriber gone, pruning");
                    closed.push(id);
                }
            }
        }

        for id in closed {
            self.unsubscribe(order_id, id);
        }

        metrics::counter!("notifications_delivered_total").increment(delivered as u64);
        delivered
    }

    /// Number of live connections for `order_id`.
    pub fn subscriber_count(&self, order_id: OrderId) -> usize {
        self.inner
            .subscribers
            .get(&order_id)
            .map(|connections| connections.len())
            .unwrap_or(0)
    }
}

/// A registered connection's event stream.
pub struct Subscription {
    order_id: OrderId,
    id: ConnectionId,
    rx: mpsc::Receiver<String>,
    notifier: OrderNotifier,
}

impl Subscription {
    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Waits for the next encoded status event.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Takes a buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.notifier.unsubscribe(self.order_id, self.id);
    }
}
