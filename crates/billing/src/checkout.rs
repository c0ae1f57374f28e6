//! Stripe Checkout sessions
//!
//! Checkout initiation is the one premium-adjacent action that bypasses the
//! entitlement gate: a free user must be able to pay to become entitled. The
//! requested plan/interval is still validated against the catalog.

use sqlx::PgPool;
use std::sync::Arc;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCustomer, Customer, CustomerId,
};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use locksum_shared::{BillingInterval, PlanTier};

use crate::catalog::PlanCatalog;
use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Transient checkout sessions expire after this long; expired rows are
/// treated as absent, not errors.
const SESSION_TTL_MINUTES: i64 = 30;

/// Checkout service for creating processor checkout sessions
#[derive(Clone)]
pub struct CheckoutService {
    stripe: StripeClient,
    pool: PgPool,
    catalog: Arc<PlanCatalog>,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient, pool: PgPool, catalog: Arc<PlanCatalog>) -> Self {
        Self {
            stripe,
            pool,
            catalog,
        }
    }

    /// Create a checkout session for a plan/interval.
    ///
    /// Validates the combination against the catalog, creates the processor
    /// customer on first use, and records the transient session row.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        email: &str,
        plan: PlanTier,
        interval: BillingInterval,
    ) -> BillingResult<CheckoutResponse> {
        if !self.catalog.offers(plan, interval) {
            return Err(BillingError::InvalidPlan(format!("{plan}/{interval}")));
        }

        let price_id = self
            .stripe
            .config()
            .price_id_for(plan, interval)
            .ok_or_else(|| BillingError::InvalidPlan(plan.to_string()))?
            .to_string();

        let customer_id = self.get_or_create_customer(user_id, email).await?;

        let base_url = &self.stripe.config().app_base_url;
        let success_url = format!("{base_url}/billing/success");
        let cancel_url = format!("{base_url}/billing/cancel");

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("plan".to_string(), plan.to_string());
        metadata.insert("interval".to_string(), interval.to_string());

        let params = CreateCheckoutSession {
            customer: Some(customer_id),
            mode: Some(CheckoutSessionMode::Subscription),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(price_id),
                quantity: Some(1),
                ..Default::default()
            }]),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            metadata: Some(metadata),
            ..Default::default()
        };

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;

        let url = session
            .url
            .clone()
            .ok_or_else(|| BillingError::StripeApi("checkout session has no URL".to_string()))?;

        self.record_session(user_id, plan, interval, session.id.as_str())
            .await?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            plan = %plan,
            interval = %interval,
            "Created checkout session"
        );

        Ok(CheckoutResponse { url })
    }

    /// Create or reuse the processor customer for a user.
    async fn get_or_create_customer(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> BillingResult<CustomerId> {
        let existing: Option<(Option<String>,)> = sqlx::query_as(
            "SELECT processor_customer_id FROM subscriptions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((Some(customer_id),)) = existing {
            return customer_id
                .parse::<CustomerId>()
                .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {e}")));
        }

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("platform".to_string(), "locksum".to_string());

        let params = CreateCustomer {
            email: Some(email),
            metadata: Some(metadata),
            ..Default::default()
        };

        let customer = Customer::create(self.stripe.inner(), params).await?;

        sqlx::query(
            "UPDATE subscriptions SET processor_customer_id = $1, updated_at = NOW()
             WHERE user_id = $2",
        )
        .bind(customer.id.as_str())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            user_id = %user_id,
            customer_id = %customer.id,
            "Created processor customer"
        );

        Ok(customer.id)
    }

    async fn record_session(
        &self,
        user_id: Uuid,
        plan: PlanTier,
        interval: BillingInterval,
        session_id: &str,
    ) -> BillingResult<()> {
        sqlx::query(
            "INSERT INTO checkout_sessions
                 (id, user_id, plan, plan_interval, processor_session_id, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(plan)
        .bind(interval)
        .bind(session_id)
        .bind(OffsetDateTime::now_utc() + Duration::minutes(SESSION_TTL_MINUTES))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete expired checkout sessions and link tokens. Called by the
    /// background sweep.
    pub async fn purge_expired(&self) -> BillingResult<u64> {
        let sessions = sqlx::query("DELETE FROM checkout_sessions WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?
            .rows_affected();
        let tokens = sqlx::query("DELETE FROM link_tokens WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(sessions + tokens)
    }
}

/// Response for creating a checkout session
#[derive(Debug, serde::Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}
