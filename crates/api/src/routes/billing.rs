//! Billing routes: checkout initiation and the webhook receiver

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use locksum_billing::{CheckoutResponse, Reconciliation, RejectReason};
use locksum_shared::{BillingInterval, PlanTier};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan: String,
    #[serde(default = "default_interval")]
    pub interval: String,
}

fn default_interval() -> String {
    "monthly".to_string()
}

/// Create a processor checkout session for a paid plan.
///
/// Deliberately not behind the entitlement gate: a free user must be able to
/// reach checkout in order to become entitled.
pub async fn create_checkout_session(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<CheckoutResponse>)> {
    let plan: PlanTier = req
        .plan
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Unknown plan: {}", req.plan)))?;
    let interval: BillingInterval = req
        .interval
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Unknown interval: {}", req.interval)))?;

    let response = state
        .billing
        .checkout
        .create_session(user.user_id, &user.email, plan, interval)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Webhook receiver for processor lifecycle notifications.
///
/// Response contract: 200 acknowledges the delivery and stops retries, even
/// for events we reject as stale, duplicate, or unsupported (redelivery would
/// produce the same outcome). 400 is reserved for signature failures and 503
/// for transient apply conflicts, both of which SHOULD be redelivered.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Webhook missing signature header");
            ApiError::BadRequest("Missing signature header".to_string())
        })?;

    let outcome = state.billing.webhooks.reconcile(signature, &body).await?;

    match outcome {
        Reconciliation::Applied { status } => {
            tracing::info!(status = %status, "Webhook applied");
        }
        Reconciliation::Ignored => {
            tracing::info!("Webhook ignored (already applied)");
        }
        Reconciliation::Rejected(RejectReason::InvalidSignature) => {
            return Err(ApiError::BadRequest("Invalid webhook signature".to_string()));
        }
        Reconciliation::Rejected(reason) => {
            // Acknowledged but not applied; redelivery cannot change this.
            tracing::warn!(reason = ?reason, "Webhook rejected");
        }
    }

    Ok((StatusCode::OK, Json(json!({ "received": true }))))
}
