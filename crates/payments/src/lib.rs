//! Payments service.
//!
//! Owns user accounts and balances. Consumes `OrderCreated` from the order
//! events destination through an idempotent inbox, charges the account and
//! answers with a `PaymentResult` written to its own outbox, which the relay
//! publishes to the payment results destination.

pub mod account;
pub mod applier;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod routes;
pub mod service;
pub mod store;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use account::Account;
pub use applier::{EffectApplier, run_effect_applier};
pub use error::{ApiError, PaymentsError, Result};
pub use memory::InMemoryPaymentStore;
pub use postgres::PostgresPaymentStore;
pub use routes::accounts::AppState;
pub use service::AccountService;
pub use store::{PaymentOutcome, PaymentStore};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: PaymentStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/api/accounts", post(routes::accounts::create::<S>))
        .route("/api/accounts/deposit", post(routes::accounts::deposit::<S>))
        .route("/api/accounts/balance", get(routes::accounts::balance::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around a store.
pub fn create_state<S: PaymentStore>(store: S) -> Arc<AppState<S>> {
    Arc::new(AppState {
        accounts: AccountService::new(store),
    })
}
