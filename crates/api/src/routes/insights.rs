//! AI insights route

use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use time::{Date, Duration, OffsetDateTime};

use locksum_shared::Feature;

use crate::{
    auth::AuthUser,
    error::ApiResult,
    gate::require_feature,
    insights::{build_debt_plan, build_report, DebtPlan, Goals, InsightsReport, RiskLevel, TxnSlice},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct InsightsQuery {
    #[serde(default = "default_days")]
    pub days: u32,
}

fn default_days() -> u32 {
    30
}

#[derive(Debug, sqlx::FromRow)]
struct TxnRow {
    amount: f64,
    occurred_on: Date,
    category: String,
}

/// Generate the spending-insights report for the analysis window.
/// Premium: requires a plan that grants AI insights.
pub async fn ai_insights(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<InsightsQuery>,
    body: Option<Json<Goals>>,
) -> ApiResult<Json<InsightsReport>> {
    require_feature(&state, user.user_id, Feature::AiInsights).await?;

    let days = query.days.clamp(1, 365);
    let today = OffsetDateTime::now_utc().date();
    let since = today - Duration::days(days as i64);

    let txns: Vec<TxnRow> = sqlx::query_as(
        "SELECT amount, occurred_on, category FROM transactions
         WHERE user_id = $1 AND occurred_on >= $2",
    )
    .bind(user.user_id)
    .bind(since)
    .fetch_all(&state.pool)
    .await?;

    let budgets: Vec<(String, f64)> =
        sqlx::query_as("SELECT category, limit_amount FROM budgets WHERE user_id = $1")
            .bind(user.user_id)
            .fetch_all(&state.pool)
            .await?;

    let slices: Vec<TxnSlice> = txns
        .into_iter()
        .map(|t| TxnSlice {
            amount: t.amount,
            occurred_on: t.occurred_on,
            category: t.category,
        })
        .collect();
    let budget_map: BTreeMap<String, f64> = budgets.into_iter().collect();
    let goals = body.map(|Json(g)| g).unwrap_or_default();

    Ok(Json(build_report(&slices, &budget_map, days, &goals, today)))
}

#[derive(Debug, Deserialize)]
pub struct DebtPlanRequest {
    pub total_debt: f64,
    pub monthly_extra: f64,
    #[serde(default)]
    pub risk: Option<String>,
}

/// Estimate a debt payoff timeline. A pure calculator over the request body,
/// so it reads no stored data and is not entitlement-gated.
pub async fn ai_debt_plan(
    _user: AuthUser,
    Json(body): Json<DebtPlanRequest>,
) -> Json<DebtPlan> {
    let risk = body
        .risk
        .as_deref()
        .map(RiskLevel::parse_lenient)
        .unwrap_or_default();
    Json(build_debt_plan(body.total_debt, body.monthly_extra, risk))
}
