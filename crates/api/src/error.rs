//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use locksum_billing::{BillingError, DecisionReason};

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Email already registered")]
    EmailAlreadyExists,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Authentication required")]
    Unauthorized,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("Resource already exists")]
    Conflict(String),

    // Entitlement gateway denial: the 402 surface
    #[error("{detail}")]
    EntitlementDenied {
        reason: DecisionReason,
        detail: String,
    },

    // Upstream provider (payment processor, bank aggregator)
    #[error("Upstream service error: {0}")]
    Upstream(String),

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidCredentials
            | ApiError::InvalidToken
            | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::EmailAlreadyExists | ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::EntitlementDenied { .. } => StatusCode::PAYMENT_REQUIRED,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };

        // Denials carry the machine-readable reason token alongside the
        // human-readable detail; everything else is detail only.
        let body = match &self {
            ApiError::EntitlementDenied { reason, detail } => Json(json!({
                "detail": detail,
                "reason": reason,
            })),
            ApiError::Database(_) => Json(json!({ "detail": "Database error" })),
            other => Json(json!({ "detail": other.to_string() })),
        };

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    // PostgreSQL unique violation
                    if code == "23505" {
                        return ApiError::Conflict("Resource already exists".to_string());
                    }
                }
                ApiError::Database(db_err.to_string())
            }
            _ => ApiError::Database(err.to_string()),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InvalidPlan(msg) | BillingError::InvalidInterval(msg) => {
                ApiError::BadRequest(msg)
            }
            BillingError::SubscriptionNotFound(_) | BillingError::NotFound(_) => ApiError::NotFound,
            BillingError::WebhookSignatureInvalid => {
                ApiError::BadRequest("Invalid webhook signature".to_string())
            }
            BillingError::StripeApi(msg) => {
                tracing::error!(error = %msg, "Payment processor error");
                ApiError::Upstream(msg)
            }
            BillingError::ConcurrentModification(msg) => {
                tracing::warn!(error = %msg, "Ledger version conflict exhausted retries");
                ApiError::ServiceUnavailable
            }
            BillingError::Database(msg) => ApiError::Database(msg),
            BillingError::Config(msg) | BillingError::Internal(msg) => {
                tracing::error!(error = %msg, "Billing internal error");
                ApiError::Internal
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_of(ApiError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(ApiError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(ApiError::EmailAlreadyExists), StatusCode::CONFLICT);
        assert_eq!(status_of(ApiError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(ApiError::BadRequest("nope".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ApiError::Upstream("bank is down".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(ApiError::ServiceUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_entitlement_denial_is_402() {
        let err = ApiError::EntitlementDenied {
            reason: DecisionReason::NotSubscribed,
            detail: "This feature requires an active subscription".to_string(),
        };
        assert_eq!(status_of(err), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn test_version_conflict_maps_to_503() {
        let err: ApiError =
            BillingError::ConcurrentModification("subscription moved".into()).into();
        assert_eq!(status_of(err), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_invalid_plan_maps_to_400() {
        let err: ApiError = BillingError::InvalidPlan("enterprise".into()).into();
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }
}
