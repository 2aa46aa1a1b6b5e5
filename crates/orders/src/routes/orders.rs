//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Money, OrderId};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::notifier::OrderNotifier;
use crate::service::OrderService;
use crate::store::OrderStore;
use crate::{Order, OrderStatus};

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub orders: OrderService<S>,
    pub notifier: OrderNotifier,
}

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub user_id: String,
    pub amount: Money,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    pub user_id: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderStatusResponse {
    pub id: OrderId,
    pub status: OrderStatus,
}

// -- Handlers --

/// POST /api/orders: place an order.
#[tracing::instrument(skip(state, req), fields(user_id = %req.user_id))]
pub async fn create<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state
        .orders
        .create_order(&req.user_id, req.amount, &req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/orders?userId=: list a user's orders.
#[tracing::instrument(skip(state))]
pub async fn list<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = state.orders.list_orders(&query.user_id).await?;
    Ok(Json(orders))
}

/// GET /api/orders/{id}/status: current status of one order.
#[tracing::instrument(skip(state))]
pub async fn status<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let id = OrderId::parse(&id)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid order id: {id}")))?;
    let status = state.orders.order_status(id).await?;
    Ok(Json(OrderStatusResponse { id, status }))
}
