//! Payments service entry point.

use std::process::ExitCode;
use std::sync::Arc;

use broker::{MessageBroker, NatsBroker, RetryPolicy, connect_with_retry};
use common::telemetry::{init_tracing, shutdown_signal};
use common::workers::BoxError;
use common::{Config, Workers, topology};
use mailbox::{Relay, RelayConfig};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use payments::{InMemoryPaymentStore, PaymentStore, PostgresPaymentStore};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;

const DEFAULT_PORT: u16 = 5002;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env(DEFAULT_PORT);
    init_tracing(&config.log_level, config.log_json);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "payments service failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), BoxError> {
    // 1. Install Prometheus metrics recorder
    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    // 2. Connect to the broker; giving up here is fatal
    let policy = RetryPolicy::new(config.broker_connect_attempts, config.broker_connect_delay);
    let nats_url = config.nats_url.clone();
    let broker = connect_with_retry(|| NatsBroker::connect(&nats_url), &policy, &nats_url).await?;
    let broker: Arc<dyn MessageBroker> = Arc::new(broker);

    // 3. Pick storage
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(&url)
                .await?;
            let store = PostgresPaymentStore::new(pool);
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL storage");
            serve(store, broker, config, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            serve(InMemoryPaymentStore::new(), broker, config, metrics_handle).await
        }
    }
}

async fn serve<S: PaymentStore + Clone + 'static>(
    store: S,
    broker: Arc<dyn MessageBroker>,
    config: Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 4. Background tasks: result relay and order payment consumer
    let relay = Relay::new(
        store.clone(),
        broker.clone(),
        topology::PAYMENT_RESULTS,
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
        "order payment consumer",
        payments::run_effect_applier(store.clone(), broker, shutdown_rx),
    );

    // 5. HTTP server
    let app = payments::create_app(payments::create_state(store), metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting payments service");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    // 6. Serve until signalled, then stop background tasks; each finishes the
    //    message in hand first. A task that stops on its own is fatal.
    workers.serve(server, &shutdown_tx).await?;

    tracing::info!("payments service shut down gracefully");
    Ok(())
}
