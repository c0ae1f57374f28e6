//! Bank linking routes
//!
//! Both endpoints sit behind the entitlement gate: bank linking is a premium
//! feature, and the number of linked accounts is capped per plan.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use locksum_shared::{Feature, LimitKind};

use crate::{
    auth::AuthUser,
    error::ApiResult,
    gate::{require_capacity, require_feature},
    state::AppState,
};

/// Plaid link tokens are valid for four hours; we purge our copies on the
/// same schedule.
const LINK_TOKEN_TTL_HOURS: i64 = 4;

#[derive(Debug, Serialize)]
pub struct LinkTokenResponse {
    pub link_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    pub public_token: String,
    #[serde(default)]
    pub institution_name: Option<String>,
}

async fn linked_account_count(state: &AppState, user_id: Uuid) -> ApiResult<u32> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM linked_accounts WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&state.pool)
            .await?;
    Ok(count.max(0) as u32)
}

/// Create a bank-link token for the authenticated user.
pub async fn create_link_token(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<LinkTokenResponse>> {
    require_feature(&state, user.user_id, Feature::BankLink).await?;
    let current = linked_account_count(&state, user.user_id).await?;
    require_capacity(&state, user.user_id, LimitKind::LinkedAccounts, current).await?;

    // Reuse a still-live token instead of minting a new one per click.
    // Expired rows fail the predicate, so they read as absent here.
    let existing: Option<(String,)> = sqlx::query_as(
        "SELECT token FROM link_tokens
         WHERE user_id = $1 AND expires_at > NOW()
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(user.user_id)
    .fetch_optional(&state.pool)
    .await?;
    if let Some((link_token,)) = existing {
        return Ok(Json(LinkTokenResponse { link_token }));
    }

    let link_token = state
        .plaid
        .create_link_token(&user.user_id.to_string())
        .await?;

    sqlx::query(
        "INSERT INTO link_tokens (id, user_id, token, expires_at)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(&link_token)
    .bind(OffsetDateTime::now_utc() + Duration::hours(LINK_TOKEN_TTL_HOURS))
    .execute(&state.pool)
    .await?;

    Ok(Json(LinkTokenResponse { link_token }))
}

/// Exchange a public token for durable credentials and persist the linked
/// account. Idempotent per (user, item): re-linking the same item refreshes
/// the access token instead of creating a duplicate row.
pub async fn exchange_public_token(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ExchangeRequest>,
) -> ApiResult<Json<Value>> {
    require_feature(&state, user.user_id, Feature::BankLink).await?;
    let current = linked_account_count(&state, user.user_id).await?;
    require_capacity(&state, user.user_id, LimitKind::LinkedAccounts, current).await?;

    let item = state.plaid.exchange_public_token(&req.public_token).await?;

    sqlx::query(
        "INSERT INTO linked_accounts (id, user_id, item_ref, access_token, institution_name)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (user_id, item_ref)
         DO UPDATE SET access_token = EXCLUDED.access_token",
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(&item.item_id)
    .bind(&item.access_token)
    .bind(req.institution_name.unwrap_or_default())
    .execute(&state.pool)
    .await?;

    tracing::info!(user_id = %user.user_id, item_ref = %item.item_id, "Bank account linked");

    Ok(Json(json!({ "status": "linked", "item_id": item.item_id })))
}
