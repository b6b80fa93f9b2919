//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use credit_ledger_core::LedgerError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Insufficient credits across wallet and subscription.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Combined balance at the time of the check.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// A reference ID was already used with a different grant.
    #[error("duplicate reference: {0}")]
    DuplicateReference(String),

    /// The wallet stayed contended through all retries.
    #[error("concurrent update contention, retry the request")]
    Contention,

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::InsufficientCredits { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                self.to_string(),
                Some(serde_json::json!({
                    "balance": balance,
                    "required": required
                })),
            ),
            Self::DuplicateReference(id) => (
                StatusCode::CONFLICT,
                "duplicate_reference",
                format!("Reference {id} already used with different parameters"),
                None,
            ),
            Self::Contention => (
                StatusCode::SERVICE_UNAVAILABLE,
                "contention",
                self.to_string(),
                None,
            ),
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidAmount(msg) => Self::BadRequest(msg),
            LedgerError::InsufficientCredits { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            LedgerError::WalletNotFound { user_id } => {
                Self::NotFound(format!("wallet not found for user {user_id}"))
            }
            LedgerError::DuplicateReference { reference_id } => {
                Self::DuplicateReference(reference_id)
            }
            LedgerError::Concurrency { .. } => Self::Contention,
            LedgerError::ExternalService { service, message } => {
                Self::ExternalService(format!("{service}: {message}"))
            }
            LedgerError::Storage(msg) | LedgerError::Serialization(msg) => Self::Internal(msg),
            LedgerError::InvalidId(err) => Self::BadRequest(err.to_string()),
        }
    }
}
