//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p payments --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{Money, OrderCreated, OrderId, PaymentResult, PaymentStatus};
use mailbox::OutboxStore;
use payments::{PaymentOutcome, PaymentStore, PaymentsError, PostgresPaymentStore};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresPaymentStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresPaymentStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE accounts, inbox_messages, outbox_messages")
        .execute(&pool)
        .await
        .unwrap();

    PostgresPaymentStore::new(pool)
}

fn order(user_id: &str, units: i64) -> OrderCreated {
    OrderCreated {
        id: OrderId::new(),
        user_id: user_id.to_string(),
        amount: Money::from_units(units),
    }
}

async fn funded(store: &PostgresPaymentStore, user_id: &str, units: i64) {
    store.create_account(user_id).await.unwrap();
    store
        .deposit(user_id, Money::from_units(units))
        .await
        .unwrap();
}

#[tokio::test]
async fn create_account_rejects_duplicates() {
    let store = get_test_store().await;

    let account = store.create_account("u1").await.unwrap();
    assert_eq!(account.balance, Money::zero());

    let err = store.create_account("u1").await.unwrap_err();
    assert!(matches!(err, PaymentsError::AccountExists(_)));
}

#[tokio::test]
async fn deposit_is_atomic_increment() {
    let store = get_test_store().await;
    store.create_account("u1").await.unwrap();

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.deposit("u1", Money::from_units(5)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let account = store.get_account("u1").await.unwrap().unwrap();
    assert_eq!(account.balance, Money::from_units(100));
}

#[tokio::test]
async fn deposit_to_missing_account_fails() {
    let store = get_test_store().await;
    let err = store.deposit("ghost", Money::from_units(5)).await.unwrap_err();
    assert!(matches!(err, PaymentsError::AccountNotFound(_)));
}

#[tokio::test]
async fn overflowing_deposit_is_rejected_and_balance_kept() {
    let store = get_test_store().await;
    store.create_account("u1").await.unwrap();
    let big = Money::from_decimal(rust_decimal::Decimal::from_scientific("7e28").unwrap());
    store.deposit("u1", big).await.unwrap();

    let err = store.deposit("u1", big).await.unwrap_err();
    assert!(matches!(err, PaymentsError::Validation(_)));

    let account = store.get_account("u1").await.unwrap().unwrap();
    assert_eq!(account.balance, big);
}

#[tokio::test]
async fn payment_commits_debit_inbox_and_result_together() {
    let store = get_test_store().await;
    funded(&store, "u1", 100).await;

    let event = order("u1", 40);
    let raw = serde_json::to_string(&event).unwrap();
    let outcome = store.apply_order_payment(&event, &raw).await.unwrap();
    assert_eq!(outcome, PaymentOutcome::Applied(PaymentStatus::Finished));

    let account = store.get_account("u1").await.unwrap().unwrap();
    assert_eq!(account.balance, Money::from_units(60));

    let inbox = mailbox::postgres::inbox_records(store.pool()).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert!(inbox[0].processed);
    assert_eq!(inbox[0].content, raw);

    let outbox = store.fetch_unprocessed(10).await.unwrap();
    assert_eq!(outbox.len(), 1);
    let result: PaymentResult = serde_json::from_str(&outbox[0].content).unwrap();
    assert_eq!(result.id, event.id);
    assert_eq!(result.status, PaymentStatus::Finished);
}

#[tokio::test]
async fn redelivered_payment_is_not_applied_twice() {
    let store = get_test_store().await;
    funded(&store, "u1", 100).await;

    let event = order("u1", 40);
    let raw = serde_json::to_string(&event).unwrap();
    store.apply_order_payment(&event, &raw).await.unwrap();

    // Simulates a relay crash after publish but before marking processed.
    let again = store.apply_order_payment(&event, &raw).await.unwrap();
    assert_eq!(again, PaymentOutcome::Duplicate);

    let account = store.get_account("u1").await.unwrap().unwrap();
    assert_eq!(account.balance, Money::from_units(60));
    assert_eq!(store.outbox().records().await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_redeliveries_apply_once() {
    let store = get_test_store().await;
    funded(&store, "u1", 100).await;

    let event = order("u1", 40);
    let raw = serde_json::to_string(&event).unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let event = event.clone();
            let raw = raw.clone();
            tokio::spawn(async move { store.apply_order_payment(&event, &raw).await })
        })
        .collect();

    let mut applied = 0;
    for task in tasks {
        if let PaymentOutcome::Applied(_) = task.await.unwrap().unwrap() {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    let account = store.get_account("u1").await.unwrap().unwrap();
    assert_eq!(account.balance, Money::from_units(60));
}

#[tokio::test]
async fn concurrent_orders_serialize_on_the_account() {
    let store = get_test_store().await;
    funded(&store, "u1", 100).await;

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let store = store.clone();
            let event = order("u1", 30);
            tokio::spawn(async move {
                let raw = serde_json::to_string(&event).unwrap();
                store.apply_order_payment(&event, &raw).await
            })
        })
        .collect();

    let mut finished = 0;
    for task in tasks {
        if task.await.unwrap().unwrap() == PaymentOutcome::Applied(PaymentStatus::Finished) {
            finished += 1;
        }
    }

    assert_eq!(finished, 3);
    let account = store.get_account("u1").await.unwrap().unwrap();
    assert_eq!(account.balance, Money::from_units(10));
}

#[tokio::test]
async fn insufficient_funds_leave_balance_unchanged() {
    let store = get_test_store().await;
    funded(&store, "u1", 30).await;

    let event = order("u1", 40);
    let raw = serde_json::to_string(&event).unwrap();
    let outcome = store.apply_order_payment(&event, &raw).await.unwrap();

    assert_eq!(outcome, PaymentOutcome::Applied(PaymentStatus::Cancelled));
    let account = store.get_account("u1").await.unwrap().unwrap();
    assert_eq!(account.balance, Money::from_units(30));
}

#[tokio::test]
async fn relay_marks_outbox_processed() {
    let store = get_test_store().await;

    let event = order("nobody", 10);
    let raw = serde_json::to_string(&event).unwrap();
    store.apply_order_payment(&event, &raw).await.unwrap();

    let batch = store.fetch_unprocessed(10).await.unwrap();
    let ids: Vec<_> = batch.iter().map(|r| r.id).collect();
    store.mark_processed(&ids, Utc::now()).await.unwrap();

    assert!(store.fetch_unprocessed(10).await.unwrap().is_empty());
    let records = store.outbox().records().await.unwrap();
    assert!(records[0].processed);
    assert!(records[0].processed_on.is_some());
}
