//! Authentication routes

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use locksum_shared::{BillingInterval, PlanTier, SubscriptionStatus};

use crate::{
    auth::{hash_password, verify_password, AuthUser},
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub plan: PlanTier,
    pub plan_interval: BillingInterval,
    pub subscription_status: SubscriptionStatus,
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Register a new user. Also seeds the implicit free/none subscription row,
/// so the resolver never sees a user without one.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Validation("A valid email is required".to_string()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;
    if existing.is_some() {
        return Err(ApiError::EmailAlreadyExists);
    }

    let password_hash = hash_password(&req.password).map_err(|e| {
        tracing::error!(error = %e, "Password hashing failed");
        ApiError::Internal
    })?;

    let user_id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, password_hash) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(&email)
        .bind(&password_hash)
        .execute(&state.pool)
        .await?;

    state.billing.ledger.init_for_user(user_id).await?;

    tracing::info!(user_id = %user_id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: user_id,
            email,
            plan: PlanTier::Free,
            plan_interval: BillingInterval::Monthly,
            subscription_status: SubscriptionStatus::None,
        }),
    ))
}

/// Log in with email/password, returning a bearer token.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = req.email.trim().to_lowercase();

    let user: Option<UserRow> =
        sqlx::query_as("SELECT id, email, password_hash FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&state.pool)
            .await?;

    // Same error for unknown email and wrong password
    let user = user.ok_or(ApiError::InvalidCredentials)?;
    let valid = verify_password(&req.password, &user.password_hash).map_err(|e| {
        tracing::error!(error = %e, "Stored password hash unreadable");
        ApiError::Internal
    })?;
    if !valid {
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.jwt.generate_token(user.id, &user.email).map_err(|e| {
        tracing::error!(error = %e, "Token generation failed");
        ApiError::Internal
    })?;

    Ok(Json(AuthResponse {
        access_token: token,
        token_type: "bearer".to_string(),
        expires_in: state.jwt.expiry_seconds(),
    }))
}

/// Current user profile with the subscription projection.
pub async fn me(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<UserResponse>> {
    let record = state.billing.ledger.load_for_user(user.user_id).await?;

    Ok(Json(UserResponse {
        id: user.user_id,
        email: user.email,
        plan: record.plan,
        plan_interval: record.plan_interval,
        subscription_status: record.status,
    }))
}
