//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use paw_points_core::PointsError;
use paw_points_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Not enough points for a purchase.
    #[error("insufficient points: balance={balance}, required={required}")]
    InsufficientPoints {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// A shop or equip request was refused by a business rule.
    #[error("{message}")]
    Rejected {
        /// Machine-readable reason.
        code: &'static str,
        /// Human-readable message.
        message: String,
    },

    /// Too many requests from this client.
    #[error("rate limit exceeded")]
    RateLimited {
        /// Seconds until a request will be admitted again.
        retry_after_secs: u64,
    },

    /// The purchase was rolled back, or the rollback itself failed.
    #[error("purchase failed: {0}")]
    PurchaseFailed(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
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
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientPoints { balance, required } => (
                StatusCode::BAD_REQUEST,
                "insufficient_points",
                self.to_string(),
                Some(serde_json::json!({
                    "success": false,
                    "remainingPoints": balance,
                    "required": required
                })),
            ),
            Self::Rejected { code, message } => (
                StatusCode::BAD_REQUEST,
                *code,
                message.clone(),
                Some(serde_json::json!({ "success": false })),
            ),
            Self::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                format!("Too many requests, retry in {retry_after_secs}s"),
                None,
            ),
            Self::PurchaseFailed(msg) => {
                tracing::error!(error = %msg, "Purchase failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "purchase_failed",
                    "The purchase could not be completed".to_string(),
                    Some(serde_json::json!({ "success": false })),
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
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

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::AlreadyExists { entity, .. } => {
                Self::Conflict(format!("{entity} already exists"))
            }
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<PointsError> for ApiError {
    fn from(err: PointsError) -> Self {
        match err {
            PointsError::InvalidAction(_)
            | PointsError::ActionNotAllowed(_)
            | PointsError::InvalidAmount(_)
            | PointsError::InvalidId(_) => Self::BadRequest(err.to_string()),
            PointsError::InsufficientFunds { balance, required } => {
                Self::InsufficientPoints { balance, required }
            }
            PointsError::ItemNotFound(_) => rejected("item_not_found", &err),
            PointsError::NotPurchasable(_) => rejected("not_purchasable", &err),
            PointsError::AlreadyOwned(_) => rejected("already_owned", &err),
            PointsError::NotOwned(_) => rejected("not_owned", &err),
            PointsError::WrongCategory { .. } => rejected("wrong_category", &err),
            PointsError::TooManyAccessories { .. } => rejected("too_many_accessories", &err),
            PointsError::AccountNotFound { .. } => Self::NotFound("Account not found".into()),
            PointsError::PurchaseFailed(msg) => Self::PurchaseFailed(msg),
            PointsError::Storage(msg) => Self::Internal(msg),
        }
    }
}

fn rejected(code: &'static str, err: &PointsError) -> ApiError {
    ApiError::Rejected {
        code,
        message: err.to_string(),
    }
}
