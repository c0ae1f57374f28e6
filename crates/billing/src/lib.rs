//! Locksum Billing
//!
//! Entitlement resolution and subscription lifecycle for the Locksum platform.
//! The crate owns the plan catalog, the subscription ledger (the only mutable
//! shared resource in the core), the lifecycle state machine, the webhook
//! reconciler, and the entitlement resolver consulted on every gated request.

pub mod catalog;
pub mod checkout;
pub mod client;
pub mod entitlement;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod reconcile;

pub use catalog::PlanCatalog;
pub use checkout::{CheckoutResponse, CheckoutService};
pub use client::{StripeClient, StripeConfig};
pub use entitlement::{Decision, DecisionReason, EntitlementService};
pub use error::{BillingError, BillingResult};
pub use ledger::{SubscriptionLedger, SubscriptionRecord};
pub use lifecycle::{transition, SubscriptionEvent, TransitionRejected};
pub use reconcile::{Reconciliation, RejectReason, WebhookReconciler};

use sqlx::PgPool;
use std::sync::Arc;

/// All billing services, built once at startup and shared across requests.
#[derive(Clone)]
pub struct Billing {
    pub catalog: Arc<PlanCatalog>,
    pub ledger: SubscriptionLedger,
    pub checkout: CheckoutService,
    pub entitlements: EntitlementService,
    pub webhooks: WebhookReconciler,
}

impl Billing {
    /// Build the billing stack. Fails fast if the catalog invariants do not
    /// hold or the processor price configuration is incomplete.
    pub fn new(stripe: StripeClient, pool: PgPool) -> BillingResult<Self> {
        let catalog = Arc::new(PlanCatalog::builtin());
        catalog.validate(stripe.config())?;

        let ledger = SubscriptionLedger::new(pool.clone());

        Ok(Self {
            checkout: CheckoutService::new(stripe.clone(), pool.clone(), Arc::clone(&catalog)),
            entitlements: EntitlementService::new(ledger.clone(), Arc::clone(&catalog)),
            webhooks: WebhookReconciler::new(
                ledger.clone(),
                stripe.config().clone(),
                Arc::clone(&catalog),
            ),
            catalog,
            ledger,
        })
    }
}
