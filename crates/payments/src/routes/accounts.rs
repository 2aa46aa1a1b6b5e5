//! Account endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use common::Money;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::service::AccountService;
use crate::store::PaymentStore;
use crate::Account;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub accounts: AccountService<S>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    pub user_id: String,
    pub amount: Money,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceQuery {
    pub user_id: String,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub user_id: String,
    pub balance: Money,
}

// -- Handlers --

/// POST /api/accounts: open an account for a user.
#[tracing::instrument(skip(state, req), fields(user_id = %req.user_id))]
pub async fn create<S: PaymentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<Json<Account>, ApiError> {
    let account = state.accounts.create_account(&req.user_id).await?;
    Ok(Json(account))
}

/// POST /api/accounts/deposit: add funds to an account.
#[tracing::instrument(skip(state, req), fields(user_id = %req.user_id))]
pub async fn deposit<S: PaymentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<Account>, ApiError> {
    let account = state.accounts.deposit(&req.user_id, req.amount).await?;
    Ok(Json(account))
}

/// GET /api/accounts/balance?userId=: read a user's balance.
#[tracing::instrument(skip(state))]
pub async fn balance<S: PaymentStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = state.accounts.balance(&query.user_id).await?;
    Ok(Json(BalanceResponse {
        user_id: account.user_id,
        balance: account.balance,
    }))
}
