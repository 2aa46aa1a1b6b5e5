//! Both services wired through an in-memory broker.
//!
//! Consumers run as background tasks exactly as in the binaries; the relays
//! are stepped by hand so each test decides when outbox rows leave.

use std::sync::Arc;
use std::time::Duration;

use broker::{InMemoryBroker, MessageBroker};
use common::{Money, PaymentResult, PaymentStatus, topology};
use mailbox::{Relay, RelayConfig};
use orders::{InMemoryOrderStore, Order, OrderNotifier, OrderService, OrderStatus};
use payments::{AccountService, InMemoryPaymentStore, PaymentStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct System {
    broker: InMemoryBroker,
    orders: OrderService<InMemoryOrderStore>,
    accounts: AccountService<InMemoryPaymentStore>,
    notifier: OrderNotifier,
    order_relay: Relay<InMemoryOrderStore>,
    payment_relay: Relay<InMemoryPaymentStore>,
    shutdown: watch::Sender<bool>,
    consumers: Vec<JoinHandle<broker::Result<()>>>,
}

impl System {
    async fn start() -> Self {
        let broker = InMemoryBroker::new();
        let shared: Arc<dyn MessageBroker> = Arc::new(broker.clone());
        shared
            .declare_queue(topology::ORDER_EVENTS, topology::PAYMENTS_INBOX_QUEUE)
            .await
            .unwrap();
        shared
            .declare_queue(topology::PAYMENT_RESULTS, topology::ORDER_RESULTS_QUEUE)
            .await
            .unwrap();

        let order_store = InMemoryOrderStore::new();
        let payment_store = InMemoryPaymentStore::new();
        let notifier = OrderNotifier::new();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let consumers = vec![
            tokio::spawn(payments::run_effect_applier(
                payment_store.clone(),
                shared.clone(),
                shutdown_rx.clone(),
            )),
            tokio::spawn(orders::run_result_listener(
                order_store.clone(),
                notifier.clone(),
                shared.clone(),
                shutdown_rx,
            )),
        ];

        Self {
            order_relay: Relay::new(
                order_store.clone(),
                shared.clone(),
                topology::ORDER_EVENTS,
                RelayConfig::default(),
            ),
            payment_relay: Relay::new(
                payment_store.clone(),
                shared,
                topology::PAYMENT_RESULTS,
                RelayConfig::default(),
            ),
            broker,
            orders: OrderService::new(order_store),
            accounts: AccountService::new(payment_store),
            notifier,
            shutdown,
            consumers,
        }
    }

    fn queues_idle(&self) -> bool {
        [topology::PAYMENTS_INBOX_QUEUE, topology::ORDER_RESULTS_QUEUE]
            .iter()
            .all(|q| self.broker.pending_count(q) == 0 && self.broker.in_flight_count(q) == 0)
    }

    /// Relays outbox rows until nothing is left to publish or consume.
    async fn settle(&self) {
        for _ in 0..500 {
            let published = self.order_relay.run_once().await.unwrap()
                + self.payment_relay.run_once().await.unwrap();
            if published == 0 && self.queues_idle() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("system did not settle");
    }

    async fn funded(&self, user_id: &str, units: i64) {
        self.accounts.create_account(user_id).await.unwrap();
        self.accounts
            .deposit(user_id, Money::from_units(units))
            .await
            .unwrap();
    }

    async fn place(&self, user_id: &str, units: i64) -> Order {
        self.orders
            .create_order(user_id, Money::from_units(units), "test order")
            .await
            .unwrap()
    }

    async fn status(&self, order: &Order) -> OrderStatus {
        self.orders.order_status(order.id).await.unwrap()
    }

    async fn balance(&self, user_id: &str) -> Money {
        self.accounts.balance(user_id).await.unwrap().balance
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        for task in self.consumers {
            task.await.unwrap().unwrap();
        }
    }
}

async fn next_event(sub: &mut orders::Subscription) -> serde_json::Value {
    let raw = tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("no event received")
        .expect("subscription closed");
    serde_json::from_str(&raw).unwrap()
}

async fn assert_no_event(sub: &mut orders::Subscription) {
    let extra = tokio::time::timeout(Duration::from_millis(100), sub.recv()).await;
    assert!(extra.is_err(), "unexpected event: {extra:?}");
}

#[tokio::test]
async fn paid_order_finishes_and_notifies_once() {
    let system = System::start().await;
    system.funded("u1", 100).await;
    assert_eq!(system.balance("u1").await, Money::from_units(100));

    let order = system.place("u1", 40).await;
    assert_eq!(system.status(&order).await, OrderStatus::New);
    let mut sub = system.notifier.subscribe(order.id);

    system.settle().await;

    assert_eq!(system.status(&order).await, OrderStatus::Finished);
    assert_eq!(system.balance("u1").await, Money::from_units(60));

    let event = next_event(&mut sub).await;
    assert_eq!(event["orderId"], order.id.to_string());
    assert_eq!(event["status"], "Finished");
    assert_no_event(&mut sub).await;

    drop(sub);
    system.stop().await;
}

#[tokio::test]
async fn order_without_account_is_cancelled() {
    let system = System::start().await;

    let order = system.place("nobody", 40).await;
    system.settle().await;

    assert_eq!(system.status(&order).await, OrderStatus::Cancelled);
    assert!(
        system
            .accounts
            .store()
            .get_account("nobody")
            .await
            .unwrap()
            .is_none()
    );

    system.stop().await;
}

#[tokio::test]
async fn insufficient_funds_cancel_and_keep_balance() {
    let system = System::start().await;
    system.funded("u1", 30).await;

    let order = system.place("u1", 40).await;
    system.settle().await;

    assert_eq!(system.status(&order).await, OrderStatus::Cancelled);
    assert_eq!(system.balance("u1").await, Money::from_units(30));

    system.stop().await;
}

#[tokio::test]
async fn redelivered_order_event_charges_once() {
    let system = System::start().await;
    system.funded("u1", 100).await;
    let order = system.place("u1", 40).await;
    system.settle().await;

    // Same bytes the relay published, as after a crash before mark-processed.
    let raw = system.orders.store().outbox_records().await[0].content.clone();
    system
        .broker
        .publish(topology::ORDER_EVENTS, raw.into_bytes())
        .await
        .unwrap();
    system.settle().await;

    assert_eq!(system.balance("u1").await, Money::from_units(60));
    assert_eq!(system.accounts.store().outbox_records().await.len(), 1);
    assert_eq!(system.accounts.store().inbox_records().await.len(), 1);
    assert_eq!(system.status(&order).await, OrderStatus::Finished);

    system.stop().await;
}

#[tokio::test]
async fn settled_order_ignores_later_results() {
    let system = System::start().await;
    system.funded("u1", 100).await;
    let order = system.place("u1", 40).await;
    system.settle().await;
    let mut sub = system.notifier.subscribe(order.id);

    for status in [PaymentStatus::Cancelled, PaymentStatus::Finished] {
        let payload = serde_json::to_vec(&PaymentResult {
            id: order.id,
            status,
        })
        .unwrap();
        system
            .broker
            .publish(topology::PAYMENT_RESULTS, payload)
            .await
            .unwrap();
    }
    system.settle().await;

    assert_eq!(system.status(&order).await, OrderStatus::Finished);
    assert_no_event(&mut sub).await;

    drop(sub);
    system.stop().await;
}

#[tokio::test]
async fn notifications_stay_with_their_order() {
    let system = System::start().await;
    system.funded("u1", 100).await;

    let paid = system.place("u1", 40).await;
    let refused = system.place("u2", 40).await;
    let mut paid_sub = system.notifier.subscribe(paid.id);
    let mut refused_sub = system.notifier.subscribe(refused.id);

    system.settle().await;

    let event = next_event(&mut paid_sub).await;
    assert_eq!(event["orderId"], paid.id.to_string());
    assert_eq!(event["status"], "Finished");
    assert_no_event(&mut paid_sub).await;

    let event = next_event(&mut refused_sub).await;
    assert_eq!(event["orderId"], refused.id.to_string());
    assert_eq!(event["status"], "Cancelled");
    assert_no_event(&mut refused_sub).await;

    drop(paid_sub);
    drop(refused_sub);
    system.stop().await;
}
