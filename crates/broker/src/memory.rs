//! In-memory implementation of the MessageBroker trait for testing and development

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{Acknowledger, Delivery, DeliveryStream, MessageBroker, Result};

#[derive(Debug, Clone)]
struct Envelope {
    destination: String,
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Envelope>,
    in_flight: HashMap<u64, Envelope>,
}

#[derive(Debug)]
struct Queue {
    name: String,
    state: Mutex<QueueState>,
    available: Notify,
}

impl Queue {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
        }
    }

    fn push(&self, envelope: Envelope) {
        self.state.lock().pending.push_back(envelope);
        self.available.notify_one();
    }

    fn take(&self, tag: u64) -> Option<Envelope> {
        let mut state = self.state.lock();
        let envelope = state.pending.pop_front()?;
        state.in_flight.insert(tag, envelope.clone());
        Some(envelope)
    }

    fn settle(&self, tag: u64, requeue: bool) {
        let mut state = self.state.lock();
        if let Some(mut envelope) = state.in_flight.remove(&tag)
            && requeue
        {
            envelope.redelivered = true;
            state.pending.push_front(envelope);
            drop(state);
            self.available.notify_one();
        }
    }
}

#[derive(Debug, Default)]
struct Topology {
    queues: HashMap<String, Arc<Queue>>,
    bindings: HashMap<String, Vec<Arc<Queue>>>,
}

/// MessageBroker implementation using in-process queues
///
/// Mirrors the broker semantics the services rely on:
/// - a publish copies the message into every queue bound to the destination
///   (and is dropped if no queue is bound)
/// - queues are durable for the lifetime of the broker value, so messages
///   wait for a consumer that subscribes later
/// - a delivery that is nacked, or dropped without being settled, goes back
///   to the front of its queue flagged as redelivered
///
/// Clones share the same queues.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    topology: Arc<Mutex<Topology>>,
    next_tag: Arc<AtomicU64>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, queue: &str) -> Option<Arc<Queue>> {
        self.topology.lock().queues.get(queue).cloned()
    }

    fn declare(&self, destination: &str, queue: &str) -> Arc<Queue> {
        let mut topology = self.topology.lock();
        let handle = topology
            .queues
            .entry(queue.to_string())
            .or_insert_with(|| Arc::new(Queue::new(queue)))
            .clone();

        let bound = topology.bindings.entry(destination.to_string()).or_default();
        if !bound.iter().any(|q| Arc::ptr_eq(q, &handle)) {
            bound.push(handle.clone());
        }
        handle
    }

    /// Number of messages waiting in a queue (not counting in-flight ones).
    pub fn pending_count(&self, queue: &str) -> usize {
        self.queue(queue)
            .map(|q| q.state.lock().pending.len())
            .unwrap_or(0)
    }

    /// Number of messages handed out from a queue but not yet settled.
    pub fn in_flight_count(&self, queue: &str) -> usize {
        self.queue(queue)
            .map(|q| q.state.lock().in_flight.len())
            .unwrap_or(0)
    }
}

struct InMemoryAcker {
    queue: Arc<Queue>,
    tag: u64,
    settled: AtomicBool,
}

impl InMemoryAcker {
    fn settle(&self, requeue: bool) {
        if !self.settled.swap(true, Ordering::AcqRel) {
            self.queue.settle(self.tag, requeue);
        }
    }
}

#[async_trait]
impl Acknowledger for InMemoryAcker {
    async fn ack(&self) -> Result<()> {
        self.settle(false);
        Ok(())
    }

    async fn nack(&self) -> Result<()> {
        self.settle(true);
        Ok(())
    }
}

impl Drop for InMemoryAcker {
    fn drop(&mut self) {
        if !self.settled.load(Ordering::Acquire) {
            tracing::debug!(queue = %self.queue.name, tag = self.tag, "unsettled delivery requeued");
            self.settle(true);
        }
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, destination: &str, payload: Vec<u8>) -> Result<()> {
        let targets = self
            .topology
            .lock()
            .bindings
            .get(destination)
            .cloned()
            .unwrap_or_default();

        if targets.is_empty() {
            tracing::debug!(destination, "no queue bound, message dropped");
        }

        for queue in targets {
            queue.push(Envelope {
                destination: destination.to_string(),
                payload: payload.clone(),
                redelivered: false,
            });
        }

        Ok(())
    }

    async fn declare_queue(&self, destination: &str, queue: &str) -> Result<()> {
        self.declare(destination, queue);
        Ok(())
    }

    async fn subscribe(&self, destination: &str, queue: &str) -> Result<DeliveryStream> {
        let handle = self.declare(destination, queue);
        let next_tag = self.next_tag.clone();

        let stream = async_stream::stream! {
            loop {
                let tag = next_tag.fetch_add(1, Ordering::Relaxed);
                match handle.take(tag) {
                    Some(envelope) => {
                        let acker = InMemoryAcker {
                            queue: handle.clone(),
                            tag,
                            settled: AtomicBool::new(false),
                        };
                        yield Ok(Delivery::new(
                            envelope.destination,
                            handle.name.clone(),
                            envelope.payload,
                            envelope.redelivered,
                            acker,
                        ));
                    }
                    None => handle.available.notified().await,
                }
            }
        };

        Ok(stream.boxed())
    }
}
