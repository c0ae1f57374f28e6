//! Entitlement Resolver
//!
//! Answers "may this user invoke this premium feature right now?" as a pure
//! function of the committed ledger row and the plan catalog. No processor
//! call ever happens on this path; the resolver only sees already-reconciled
//! state, and nothing is cached beyond the request.

use locksum_shared::{Feature, LimitKind, PlanTier, SubscriptionStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::PlanCatalog;
use crate::error::BillingResult;
use crate::ledger::{SubscriptionLedger, SubscriptionRecord};

/// Why a decision came out the way it did. The tokens are a stable contract;
/// callers render them, tests check them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Granted,
    NotSubscribed,
    PlanLacksFeature,
    LimitExceeded,
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Granted => write!(f, "granted"),
            Self::NotSubscribed => write!(f, "not_subscribed"),
            Self::PlanLacksFeature => write!(f, "plan_lacks_feature"),
            Self::LimitExceeded => write!(f, "limit_exceeded"),
        }
    }
}

/// An ephemeral per-request decision. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub granted: bool,
    pub reason: DecisionReason,
    pub plan: PlanTier,
    pub status: SubscriptionStatus,
}

impl Decision {
    fn granted(plan: PlanTier, status: SubscriptionStatus) -> Self {
        Self {
            granted: true,
            reason: DecisionReason::Granted,
            plan,
            status,
        }
    }

    fn denied(reason: DecisionReason, plan: PlanTier, status: SubscriptionStatus) -> Self {
        Self {
            granted: false,
            reason,
            plan,
            status,
        }
    }
}

/// Pure decision: granted iff status is entitled AND the plan grants the
/// feature. An un-entitled status denies regardless of tier, so a past-due
/// `plus` user reads as `not_subscribed`, not `plan_lacks_feature`.
pub fn decide_feature(
    plan: PlanTier,
    status: SubscriptionStatus,
    feature: Feature,
    catalog: &PlanCatalog,
) -> Decision {
    if !status.is_entitled() {
        return Decision::denied(DecisionReason::NotSubscribed, plan, status);
    }
    if !catalog.grants(plan, feature) {
        return Decision::denied(DecisionReason::PlanLacksFeature, plan, status);
    }
    Decision::granted(plan, status)
}

/// Pure limit check: entitled status first, then `current < limit`.
pub fn decide_limit(
    plan: PlanTier,
    status: SubscriptionStatus,
    kind: LimitKind,
    current: u32,
    catalog: &PlanCatalog,
) -> Decision {
    if !status.is_entitled() {
        return Decision::denied(DecisionReason::NotSubscribed, plan, status);
    }
    if current >= catalog.limit_of(plan, kind) {
        return Decision::denied(DecisionReason::LimitExceeded, plan, status);
    }
    Decision::granted(plan, status)
}

/// Resolver service: one ledger read, then the pure decision.
#[derive(Clone)]
pub struct EntitlementService {
    ledger: SubscriptionLedger,
    catalog: Arc<PlanCatalog>,
}

impl EntitlementService {
    pub fn new(ledger: SubscriptionLedger, catalog: Arc<PlanCatalog>) -> Self {
        Self { ledger, catalog }
    }

    /// `resolve(userId, feature) -> Decision`
    pub async fn resolve(&self, user_id: Uuid, feature: Feature) -> BillingResult<Decision> {
        let record = self.ledger.load_for_user(user_id).await?;
        Ok(self.resolve_record(&record, feature))
    }

    /// Decision against an already-loaded row (single read per request).
    pub fn resolve_record(&self, record: &SubscriptionRecord, feature: Feature) -> Decision {
        decide_feature(record.plan, record.status, feature, &self.catalog)
    }

    /// Limit-style check, e.g. linked bank account count against the plan cap.
    pub async fn resolve_limit(
        &self,
        user_id: Uuid,
        kind: LimitKind,
        current: u32,
    ) -> BillingResult<Decision> {
        let record = self.ledger.load_for_user(user_id).await?;
        Ok(decide_limit(record.plan, record.status, kind, current, &self.catalog))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PlanCatalog {
        PlanCatalog::builtin()
    }

    #[test]
    fn granted_iff_entitled_and_plan_grants() {
        let catalog = catalog();
        for status in [
            SubscriptionStatus::None,
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
        ] {
            for plan in PlanTier::ALL {
                let d = decide_feature(plan, status, Feature::AiInsights, &catalog);
                let expected = status.is_entitled() && catalog.grants(plan, Feature::AiInsights);
                assert_eq!(d.granted, expected, "plan={plan} status={status}");
            }
        }
    }

    #[test]
    fn free_user_is_not_subscribed() {
        let d = decide_feature(
            PlanTier::Free,
            SubscriptionStatus::None,
            Feature::AiInsights,
            &catalog(),
        );
        assert!(!d.granted);
        assert_eq!(d.reason, DecisionReason::NotSubscribed);
        assert_eq!(d.reason.to_string(), "not_subscribed");
    }

    #[test]
    fn past_due_plus_user_denied_as_not_subscribed() {
        // Tier is still plus; the status alone must deny, and the reason must
        // stay not_subscribed rather than plan_lacks_feature.
        let d = decide_feature(
            PlanTier::Plus,
            SubscriptionStatus::PastDue,
            Feature::AiInsights,
            &catalog(),
        );
        assert!(!d.granted);
        assert_eq!(d.reason, DecisionReason::NotSubscribed);
    }

    #[test]
    fn active_plus_lacks_pro_feature() {
        let d = decide_feature(
            PlanTier::Plus,
            SubscriptionStatus::Active,
            Feature::ExtraAccounts,
            &catalog(),
        );
        assert!(!d.granted);
        assert_eq!(d.reason, DecisionReason::PlanLacksFeature);
    }

    #[test]
    fn trialing_counts_as_entitled() {
        let d = decide_feature(
            PlanTier::Pro,
            SubscriptionStatus::Trialing,
            Feature::BankLink,
            &catalog(),
        );
        assert!(d.granted);
        assert_eq!(d.reason, DecisionReason::Granted);
    }

    #[test]
    fn limit_check_caps_linked_accounts() {
        let catalog = catalog();
        let under = decide_limit(
            PlanTier::Plus,
            SubscriptionStatus::Active,
            LimitKind::LinkedAccounts,
            2,
            &catalog,
        );
        assert!(under.granted);

        let at_cap = decide_limit(
            PlanTier::Plus,
            SubscriptionStatus::Active,
            LimitKind::LinkedAccounts,
            3,
            &catalog,
        );
        assert!(!at_cap.granted);
        assert_eq!(at_cap.reason, DecisionReason::LimitExceeded);
    }

    #[test]
    fn limit_check_requires_entitled_status() {
        let d = decide_limit(
            PlanTier::Pro,
            SubscriptionStatus::Canceled,
            LimitKind::LinkedAccounts,
            0,
            &catalog(),
        );
        assert!(!d.granted);
        assert_eq!(d.reason, DecisionReason::NotSubscribed);
    }
}
