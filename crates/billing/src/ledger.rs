//! Subscription Ledger
//!
//! Durable record of each user's subscription. The ledger row is the only
//! mutable shared resource in the core: it is mutated exclusively through the
//! state machine under optimistic concurrency (compare-and-swap on `version`),
//! never through direct field writes from the resolver or the gateway.

use locksum_shared::{BillingInterval, PlanTier, SubscriptionStatus};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::lifecycle::{transition, SubscriptionEvent};

/// A committed ledger row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscriptionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan: PlanTier,
    pub plan_interval: BillingInterval,
    pub status: SubscriptionStatus,
    pub processor_customer_id: Option<String>,
    pub processor_subscription_id: Option<String>,
    pub version: i64,
    pub last_event_id: Option<String>,
    pub last_event_at: Option<OffsetDateTime>,
}

const RECORD_COLUMNS: &str = "id, user_id, plan, plan_interval, status, \
     processor_customer_id, processor_subscription_id, version, last_event_id, last_event_at";

/// Ledger service. Reads are always against the latest committed version;
/// writes are conditional on the version observed at read time.
#[derive(Clone)]
pub struct SubscriptionLedger {
    pool: PgPool,
}

impl SubscriptionLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the implicit free/none row for a freshly registered user.
    pub async fn init_for_user(&self, user_id: Uuid) -> BillingResult<()> {
        sqlx::query(
            "INSERT INTO subscriptions (id, user_id, plan, plan_interval, status)
             VALUES ($1, $2, 'free', 'monthly', 'none')
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load a user's row. Every user has one from registration onward.
    pub async fn load_for_user(&self, user_id: Uuid) -> BillingResult<SubscriptionRecord> {
        let row: Option<SubscriptionRecord> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM subscriptions WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| BillingError::SubscriptionNotFound(user_id.to_string()))
    }

    /// Look up the row owned by a processor customer reference.
    pub async fn load_by_customer_ref(
        &self,
        customer_id: &str,
    ) -> BillingResult<Option<SubscriptionRecord>> {
        let row: Option<SubscriptionRecord> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM subscriptions WHERE processor_customer_id = $1"
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Record the processor customer reference created during checkout.
    pub async fn set_customer_ref(&self, user_id: Uuid, customer_id: &str) -> BillingResult<()> {
        sqlx::query(
            "UPDATE subscriptions SET processor_customer_id = $1, updated_at = NOW()
             WHERE user_id = $2",
        )
        .bind(customer_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Has this event id already been applied to the ledger?
    pub async fn event_applied(&self, event_id: &str) -> BillingResult<bool> {
        let hit: Option<(String,)> =
            sqlx::query_as("SELECT event_id FROM subscription_events WHERE event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hit.is_some())
    }

    /// Apply a lifecycle event to a row read at `record.version`.
    ///
    /// Single conditional write: if the version moved between read and write,
    /// zero rows match and `ConcurrentModification` is returned so the caller
    /// can retry against the fresh row. The dedup record is written in the
    /// same transaction as the status change.
    pub async fn apply_event(
        &self,
        record: &SubscriptionRecord,
        event: &SubscriptionEvent,
        event_id: &str,
        event_at: OffsetDateTime,
        processor_subscription_id: Option<&str>,
    ) -> BillingResult<SubscriptionStatus> {
        let next = transition(record.status, event)
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let (plan, interval) = match event {
            SubscriptionEvent::CheckoutCompleted { plan, interval, .. } => (*plan, *interval),
            _ => (record.plan, record.plan_interval),
        };

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE subscriptions
             SET status = $1,
                 plan = $2,
                 plan_interval = $3,
                 processor_subscription_id = COALESCE($4, processor_subscription_id),
                 version = version + 1,
                 last_event_id = $5,
                 last_event_at = $6,
                 updated_at = NOW()
             WHERE id = $7 AND version = $8",
        )
        .bind(next)
        .bind(plan)
        .bind(interval)
        .bind(processor_subscription_id)
        .bind(event_id)
        .bind(event_at)
        .bind(record.id)
        .bind(record.version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(BillingError::ConcurrentModification(format!(
                "subscription {} moved past version {}",
                record.id, record.version
            )));
        }

        sqlx::query(
            "INSERT INTO subscription_events (event_id, subscription_id, event_type)
             VALUES ($1, $2, $3)
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(event_id)
        .bind(record.id)
        .bind(event.name())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            subscription_id = %record.id,
            user_id = %record.user_id,
            event = event.name(),
            from = %record.status,
            to = %next,
            version = record.version + 1,
            "Applied subscription transition"
        );

        Ok(next)
    }

    /// Rows that have sat in `past_due` since before `cutoff`, for the grace
    /// sweep.
    pub async fn past_due_since(
        &self,
        cutoff: OffsetDateTime,
    ) -> BillingResult<Vec<SubscriptionRecord>> {
        let rows: Vec<SubscriptionRecord> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM subscriptions
             WHERE status = 'past_due' AND last_event_at < $1"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
