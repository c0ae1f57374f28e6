//! Locksum API server

use std::time::Duration;

use time::{Duration as TimeDuration, OffsetDateTime};

use locksum_api::{routes, AppState, Config};
use locksum_billing::{lifecycle::SubscriptionEvent, Billing, StripeClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(bind = %config.bind_address, "Starting Locksum API");

    let pool = locksum_shared::db::create_pool(&config.database_url).await?;
    locksum_shared::db::run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");

    let stripe = StripeClient::from_env()?;
    let billing = Billing::new(stripe, pool.clone())?;

    let plaid = locksum_api::plaid::PlaidClient::new(
        locksum_api::plaid::PlaidConfig::from_config(&config),
    );

    let state = AppState::new(pool, config.clone(), billing.clone(), plaid);

    // Background sweep: expire past-due subscriptions whose grace window
    // elapsed, and purge expired checkout sessions and link tokens.
    let grace_days = config.past_due_grace_days;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            if let Err(e) = run_sweep(&billing, grace_days).await {
                tracing::error!(error = %e, "Background sweep failed");
            }
        }
    });

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!(addr = %config.bind_address, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// One pass of the periodic maintenance sweep.
async fn run_sweep(billing: &Billing, grace_days: i64) -> anyhow::Result<()> {
    let cutoff = OffsetDateTime::now_utc() - TimeDuration::days(grace_days);
    let expired = billing.ledger.past_due_since(cutoff).await?;

    for record in expired {
        // Synthetic event id keyed on the observed version, so a sweep that
        // races a webhook (or another sweep) stays idempotent.
        let event_id = format!("grace_{}_{}", record.id, record.version);
        match billing
            .ledger
            .apply_event(
                &record,
                &SubscriptionEvent::GraceExpired,
                &event_id,
                OffsetDateTime::now_utc(),
                None,
            )
            .await
        {
            Ok(status) => {
                tracing::info!(
                    subscription_id = %record.id,
                    status = %status,
                    "Grace period expired, subscription canceled"
                );
            }
            Err(e) => {
                // A concurrent webhook may have moved the row; the next pass
                // re-reads and decides again.
                tracing::warn!(
                    subscription_id = %record.id,
                    error = %e,
                    "Grace expiry not applied"
                );
            }
        }
    }

    let purged = billing.checkout.purge_expired().await?;
    if purged > 0 {
        tracing::debug!(purged, "Purged expired checkout sessions and link tokens");
    }

    Ok(())
}
