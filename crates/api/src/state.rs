//! Shared application state

use std::sync::Arc;

use locksum_billing::Billing;
use sqlx::PgPool;

use crate::auth::JwtManager;
use crate::config::Config;
use crate::plaid::PlaidClient;

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt: JwtManager,
    pub billing: Billing,
    pub plaid: PlaidClient,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, billing: Billing, plaid: PlaidClient) -> Self {
        let jwt = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);
        Self {
            pool,
            config: Arc::new(config),
            jwt,
            billing,
            plaid,
        }
    }
}
