//! API routes

pub mod auth;
pub mod bank;
pub mod billing;
pub mod finance;
pub mod health;
pub mod insights;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Public routes: registration, login, and the webhook receiver (which
    // authenticates by signature, not bearer token).
    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/billing/webhook", post(billing::webhook));

    // Protected routes: the AuthUser extractor rejects missing/invalid
    // tokens with 401 before the handler runs. Premium handlers additionally
    // pass through the entitlement gate.
    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/billing/checkout-session", post(billing::create_checkout_session))
        .route("/plaid/link-token", post(bank::create_link_token))
        .route("/plaid/exchange", post(bank::exchange_public_token))
        .route("/transactions", get(finance::list_transactions))
        .route("/transactions", post(finance::create_transaction))
        .route("/budgets", get(finance::list_budgets))
        .route("/budgets", post(finance::create_budget))
        .route("/ai/insights", post(insights::ai_insights))
        .route("/ai/debt-plan", post(insights::ai_debt_plan));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
