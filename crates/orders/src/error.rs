use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::OrderId;
use thiserror::Error;

/// Errors that can occur in the orders service.
#[derive(Debug, Error)]
pub enum OrdersError {
    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The request failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A stored row could not be read back.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A mailbox error occurred.
    #[error("Mailbox error: {0}")]
    Mailbox(#[from] mailbox::MailboxError),
}

/// Result type for orders operations.
pub type Result<T> = std::result::Result<T, OrdersError>;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<OrdersError> for ApiError {
    fn from(err: OrdersError) -> Self {
        match err {
            OrdersError::OrderNotFound(_) => ApiError::NotFound(err.to_string()),
            OrdersError::Validation(msg) => ApiError::BadRequest(msg),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}
