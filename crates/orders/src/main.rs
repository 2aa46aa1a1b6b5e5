//! Orders service entry point.

use std::process::ExitCode;
use std::sync::Arc;

use broker::{MessageBroker, NatsBroker, RetryPolicy, connect_with_retry};
use common::telemetry::{init_tracing, shutdown_signal};
use common::workers::BoxError;
use common::{Config, Workers, topology};
use mailbox::{Relay, RelayConfig};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use orders::{InMemoryOrderStore, OrderNotifier, OrderStore, PostgresOrderStore};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;

const DEFAULT_PORT: u16 = 5001;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env(DEFAULT_PORT);
    init_tracing(&config.log_level, config.log_json);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "orders service failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), BoxError> {
    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    let policy = RetryPolicy::new(config.broker_connect_attempts, config.broker_connect_delay);
    let nats_url = config.nats_url.clone();
    let broker = connect_with_retry(|| NatsBroker::connect(&nats_url), &policy, &nats_url).await?;
    let broker: Arc<dyn MessageBroker> = Arc::new(broker);

    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(&url)
                .await?;
            let store = PostgresOrderStore::new(pool);
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL storage");
            serve(store, broker, config, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            serve(InMemoryOrderStore::new(), broker, config, metrics_handle).await
        }
    }
}

async fn serve<S: OrderStore + Clone + 'static>(
    store: S,
    broker: Arc<dyn MessageBroker>,
    config: Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let notifier = OrderNotifier::new();

    // Order event relay and payment result consumer
    let relay = Relay::new(
        store.clone(),
        broker.clone(),
        topology::ORDER_EVENTS,
        RelayConfig {
            batch_size: config.relay_batch_size,
            interval: config.relay_interval,
        },
    );
    let relay_shutdown = shutdown_rx.clone();
    let mut workers = Workers::new();
    workers.spawn("outbox relay", async move {
        relay.run(relay_shutdown).await;
        Ok::<(), BoxError>(())
    });
    workers.spawn(
        "payment result listener",
        orders::run_result_listener(store.clone(), notifier.clone(), broker, shutdown_rx),
    );

    let app = orders::create_app(orders::create_state(store, notifier), metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting orders service");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    // A background task stopping before the server is fatal.
    workers.serve(server, &shutdown_tx).await?;

    tracing::info!("orders service shut down gracefully");
    Ok(())
}
