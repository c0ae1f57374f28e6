//! Transactions and budgets

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::Date;
use uuid::Uuid;

use crate::{auth::AuthUser, error::ApiError, error::ApiResult, state::AppState};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct TransactionCreate {
    pub name: String,
    pub amount: f64,
    pub date: Date,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct TransactionOut {
    pub id: Uuid,
    pub name: String,
    pub amount: f64,
    #[sqlx(rename = "occurred_on")]
    pub date: Date,
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct BudgetCreate {
    pub category: String,
    pub limit_amount: f64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct BudgetOut {
    pub id: Uuid,
    pub category: String,
    pub limit_amount: f64,
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn create_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<TransactionCreate>,
) -> ApiResult<(StatusCode, Json<TransactionOut>)> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("Transaction name is required".to_string()));
    }

    let id = Uuid::new_v4();
    let category = req
        .category
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| "Uncategorized".to_string());

    sqlx::query(
        "INSERT INTO transactions (id, user_id, name, amount, occurred_on, category)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(user.user_id)
    .bind(req.name.trim())
    .bind(req.amount)
    .bind(req.date)
    .bind(&category)
    .execute(&state.pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(TransactionOut {
            id,
            name: req.name.trim().to_string(),
            amount: req.amount,
            date: req.date,
            category,
        }),
    ))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<TransactionOut>>> {
    let rows: Vec<TransactionOut> = sqlx::query_as(
        "SELECT id, name, amount, occurred_on, category FROM transactions
         WHERE user_id = $1
         ORDER BY occurred_on DESC, created_at DESC",
    )
    .bind(user.user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

/// Create or replace the budget for a category. One budget per category
/// per user.
pub async fn create_budget(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<BudgetCreate>,
) -> ApiResult<(StatusCode, Json<BudgetOut>)> {
    let category = req.category.trim().to_string();
    if category.is_empty() {
        return Err(ApiError::Validation("Budget category is required".to_string()));
    }
    if req.limit_amount <= 0.0 {
        return Err(ApiError::Validation(
            "Budget limit must be positive".to_string(),
        ));
    }

    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO budgets (id, user_id, category, limit_amount)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (user_id, category)
         DO UPDATE SET limit_amount = EXCLUDED.limit_amount
         RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(&category)
    .bind(req.limit_amount)
    .fetch_one(&state.pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(BudgetOut {
            id,
            category,
            limit_amount: req.limit_amount,
        }),
    ))
}

pub async fn list_budgets(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<BudgetOut>>> {
    let rows: Vec<BudgetOut> = sqlx::query_as(
        "SELECT id, category, limit_amount FROM budgets
         WHERE user_id = $1
         ORDER BY category",
    )
    .bind(user.user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}
