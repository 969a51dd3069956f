//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use batpoints_core::LedgerError;
use batpoints_store::StoreError;

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

    /// Invalid amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Conflict - resource already exists or invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Not enough spendable points.
    #[error("insufficient balance: available={available}, required={required}")]
    InsufficientBalance {
        /// Spendable points.
        available: i64,
        /// Points required.
        required: i64,
    },

    /// Per-user limit reached.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Token payout failed.
    #[error("chain transfer failed: {reason}")]
    ChainTransferFailed {
        /// The conversion.
        conversion_id: String,
        /// Sanitised reason.
        reason: String,
    },

    /// Account busy; the client may retry.
    #[error("account is busy, retry")]
    Busy,

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
            Self::InvalidAmount(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_amount", msg.clone(), None)
            }
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientBalance {
                available,
                required,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_balance",
                format!("Insufficient balance. Available: {available}, Required: {required}"),
                Some(serde_json::json!({
                    "available": available,
                    "required": required
                })),
            ),
            Self::LimitExceeded(msg) => (
                StatusCode::TOO_MANY_REQUESTS,
                "limit_exceeded",
                msg.clone(),
                None,
            ),
            Self::ChainTransferFailed {
                conversion_id,
                reason,
            } => (
                StatusCode::BAD_GATEWAY,
                "chain_transfer_failed",
                reason.clone(),
                Some(serde_json::json!({ "conversion_id": conversion_id })),
            ),
            Self::Busy => (
                StatusCode::CONFLICT,
                "concurrent_modification",
                self.to_string(),
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
            LedgerError::NotFound { entity, id } => {
                Self::NotFound(format!("{entity} not found: {id}"))
            }
            LedgerError::ContentNotFound { content_id } => {
                Self::NotFound(format!("content not found: {content_id}"))
            }
            LedgerError::AlreadyExists { entity, id } => {
                Self::Conflict(format!("{entity} already exists: {id}"))
            }
            LedgerError::InvalidAmount(msg) => Self::InvalidAmount(msg),
            LedgerError::InvalidInput(msg) => Self::BadRequest(msg),
            LedgerError::InvalidId(e) => Self::BadRequest(e.to_string()),
            LedgerError::SelfTipNotAllowed => Self::BadRequest("You cannot tip yourself".into()),
            LedgerError::InsufficientBalance {
                available,
                required,
            } => Self::InsufficientBalance {
                available,
                required,
            },
            LedgerError::ConversionLimitExceeded(msg) => Self::LimitExceeded(msg),
            LedgerError::ChainTransferFailed {
                conversion_id,
                reason,
            } => Self::ChainTransferFailed {
                conversion_id,
                reason,
            },
            LedgerError::ConcurrentModification { .. } => Self::Busy,
            e @ LedgerError::InvalidTransition { .. } => Self::Conflict(e.to_string()),
            LedgerError::Storage(msg) => Self::Internal(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        LedgerError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_balance_is_402_with_details() {
        let response = ApiError::from(LedgerError::InsufficientBalance {
            available: 50,
            required: 100,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn lock_timeout_maps_to_busy() {
        let err = ApiError::from(StoreError::LockTimeout {
            key: "abc".into(),
        });
        assert!(matches!(err, ApiError::Busy));
    }

    #[test]
    fn self_tip_message() {
        let err = ApiError::from(LedgerError::SelfTipNotAllowed);
        assert!(matches!(err, ApiError::BadRequest(ref m) if m == "You cannot tip yourself"));
    }
}
