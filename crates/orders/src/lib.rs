//! Orders service.
//!
//! Takes orders and writes an `OrderCreated` event to the outbox in the same
//! unit of work; the relay publishes it to the order events destination.
//! Payment outcomes come back through the result listener, which settles the
//! order once and pushes the new status to WebSocket subscribers.

pub mod error;
pub mod listener;
pub mod memory;
pub mod notifier;
pub mod order;
pub mod postgres;
pub mod routes;
pub mod service;
pub mod store;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, OrdersError, Result};
pub use listener::{ResultListener, run_result_listener};
pub use memory::InMemoryOrderStore;
pub use notifier::{OrderNotifier, StatusEvent, Subscription};
pub use order::{Order, OrderStatus};
pub use postgres::PostgresOrderStore;
pub use routes::orders::AppState;
pub use service::OrderService;
pub use store::{OrderStore, StatusChange};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrderStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/api/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/api/orders/{id}/status", get(routes::orders::status::<S>))
        .route("/ws", get(ws::upgrade::<S>))
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

/// Creates the application state around a store and a notifier.
///
/// The same notifier must be handed to the result listener.
pub fn create_state<S: OrderStore>(store: S, notifier: OrderNotifier) -> Arc<AppState<S>> {
    Arc::new(AppState {
        orders: OrderService::new(store),
        notifier,
    })
}
