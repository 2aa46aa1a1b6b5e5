use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors that can occur in the payments service.
#[derive(Debug, Error)]
pub enum PaymentsError {
    /// An account already exists for this user.
    #[error("Account already exists for user {0}")]
    AccountExists(String),

    /// No account exists for this user.
    #[error("Account not found for user {0}")]
    AccountNotFound(String),

    /// The request failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

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

/// Result type for payments operations.
pub type Result<T> = std::result::Result<T, PaymentsError>;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The resource already exists.
    Conflict(String),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<PaymentsError> for ApiError {
    fn from(err: PaymentsError) -> Self {
        match err {
            PaymentsError::AccountExists(_) => ApiError::Conflict(err.to_string()),
            PaymentsError::AccountNotFound(_) => ApiError::NotFound(err.to_string()),
            PaymentsError::Validation(msg) => ApiError::BadRequest(msg),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}
