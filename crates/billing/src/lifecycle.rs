//! Subscription lifecycle state machine
//!
//! Pure logic mapping processor lifecycle events to status transitions.
//! Anything not listed here is rejected, not applied; that rejection is the
//! correctness property protecting the ledger against out-of-order webhook
//! delivery.

use locksum_shared::{BillingInterval, PlanTier, SubscriptionStatus};
use thiserror::Error;

/// Lifecycle events fed into the state machine, derived from processor
/// notifications (or, for `GraceExpired`, from the grace sweep).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    /// Checkout completed for a plan; `trial` starts the cycle in `trialing`.
    CheckoutCompleted {
        plan: PlanTier,
        interval: BillingInterval,
        trial: bool,
    },
    /// A renewal invoice was paid.
    Renewed,
    /// A payment attempt failed.
    PaymentFailed,
    /// The subscription was canceled explicitly.
    Canceled,
    /// The past-due grace deadline elapsed without a successful retry.
    GraceExpired,
}

impl SubscriptionEvent {
    /// Stable name used for the dedup record and logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CheckoutCompleted { .. } => "checkout_completed",
            Self::Renewed => "renewed",
            Self::PaymentFailed => "payment_failed",
            Self::Canceled => "canceled",
            Self::GraceExpired => "grace_expired",
        }
    }
}

/// A transition the state machine refuses to apply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event {event} not applicable in status {current}")]
pub struct TransitionRejected {
    pub current: SubscriptionStatus,
    pub event: &'static str,
}

/// `(currentState, event) -> nextState | rejected`.
pub fn transition(
    current: SubscriptionStatus,
    event: &SubscriptionEvent,
) -> Result<SubscriptionStatus, TransitionRejected> {
    use SubscriptionStatus::*;

    let next = match (current, event) {
        // A fresh cycle starts from never-subscribed or canceled.
        (None | Canceled, SubscriptionEvent::CheckoutCompleted { trial, .. }) => {
            if *trial {
                Trialing
            } else {
                Active
            }
        }

        // Trials convert on their first paid invoice; past-due recovers on a
        // successful retry; an active renewal is a no-op transition.
        (Trialing | Active | PastDue, SubscriptionEvent::Renewed) => Active,

        (Trialing | Active, SubscriptionEvent::PaymentFailed) => PastDue,

        (Trialing | Active | PastDue, SubscriptionEvent::Canceled) => Canceled,

        (PastDue, SubscriptionEvent::GraceExpired) => Canceled,

        _ => {
            return Err(TransitionRejected {
                current,
                event: event.name(),
            })
        }
    };

    Ok(next)
}
