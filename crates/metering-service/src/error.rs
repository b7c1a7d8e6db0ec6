//! API error types and responses.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Webhook signature missing or invalid; the event must have no effect.
    #[error("invalid signature")]
    SignatureInvalid,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A second paid checkout was attempted while a subscription is active.
    #[error("an active subscription already exists")]
    DuplicateSubscription,

    /// The paid tier required for this operation is missing.
    #[error("operation requires a paid plan")]
    PlanRequired,

    /// Insufficient credits.
    #[error("insufficient credits: remaining={remaining}, required={required}")]
    InsufficientCredits {
        /// Credits left on the account.
        remaining: i64,
        /// Credits the operation needs.
        required: i64,
    },

    /// Fixed-window rate limit tripped.
    #[error("rate limited")]
    RateLimited {
        /// Seconds until the window rolls over.
        retry_after_seconds: u64,
    },

    /// Per-account daily soft quota exhausted.
    #[error("daily quota exceeded: {used}/{cap}")]
    QuotaExceeded {
        /// Attempts counted today.
        used: u64,
        /// The configured cap.
        cap: u64,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Downstream provider or processor failure.
    #[error("upstream error: {0}")]
    Upstream(String),
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
            Self::SignatureInvalid => (
                StatusCode::UNAUTHORIZED,
                "signature_invalid",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::DuplicateSubscription => (
                StatusCode::CONFLICT,
                "duplicate_subscription",
                self.to_string(),
                None,
            ),
            Self::PlanRequired => (
                StatusCode::FORBIDDEN,
                "plan_required",
                self.to_string(),
                None,
            ),
            Self::InsufficientCredits {
                remaining,
                required,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                self.to_string(),
                Some(serde_json::json!({
                    "remaining": remaining,
                    "required": required
                })),
            ),
            Self::RateLimited {
                retry_after_seconds,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                self.to_string(),
                Some(serde_json::json!({ "retry_after_seconds": retry_after_seconds })),
            ),
            Self::QuotaExceeded { used, cap } => (
                StatusCode::TOO_MANY_REQUESTS,
                "quota_exceeded",
                self.to_string(),
                Some(serde_json::json!({ "used": used, "cap": cap })),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::Upstream(msg) => (StatusCode::BAD_GATEWAY, "upstream_error", msg.clone(), None),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited {
            retry_after_seconds,
        } = self
        {
            if let Ok(value) = header::HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<metering_store::StoreError> for ApiError {
    fn from(err: metering_store::StoreError) -> Self {
        match err {
            metering_store::StoreError::NotFound { entity, id } => {
                Self::NotFound(format!("{entity} not found: {id}"))
            }
            metering_store::StoreError::InsufficientCredits {
                remaining,
                required,
            } => Self::InsufficientCredits {
                remaining,
                required,
            },
            metering_store::StoreError::InvalidCost(cost) => {
                Self::BadRequest(format!("invalid operation cost: {cost}"))
            }
            metering_store::StoreError::Database(msg)
            | metering_store::StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}
