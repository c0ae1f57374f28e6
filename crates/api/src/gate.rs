//! Gated action gateway
//!
//! Every premium endpoint calls through here before doing any work. A denial
//! short-circuits the request with 402 and a `{detail, reason}` body; the
//! handler body never runs. Checkout initiation is deliberately NOT gated.

use locksum_billing::{Decision, DecisionReason};
use locksum_shared::{Feature, LimitKind};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Human-readable denial detail for the 402 body.
fn denial_detail(decision: &Decision, feature: Option<Feature>) -> String {
    match decision.reason {
        DecisionReason::NotSubscribed => {
            "This feature requires an active subscription".to_string()
        }
        DecisionReason::PlanLacksFeature => match feature {
            Some(f) => format!("The {} plan does not include {}", decision.plan, f),
            None => format!("The {} plan does not include this feature", decision.plan),
        },
        DecisionReason::LimitExceeded => {
            format!("The {} plan limit for this resource has been reached", decision.plan)
        }
        DecisionReason::Granted => "granted".to_string(),
    }
}

/// Turn a decision into a handler outcome. Pure so the short-circuit
/// behavior is testable without a server.
fn enforce(decision: Decision, feature: Option<Feature>) -> ApiResult<Decision> {
    if decision.granted {
        return Ok(decision);
    }

    tracing::info!(
        reason = %decision.reason,
        plan = %decision.plan,
        status = %decision.status,
        "Gated action denied"
    );

    Err(ApiError::EntitlementDenied {
        reason: decision.reason,
        detail: denial_detail(&decision, feature),
    })
}

/// Require that the user's current plan and status grant `feature`.
pub async fn require_feature(
    state: &AppState,
    user_id: Uuid,
    feature: Feature,
) -> ApiResult<Decision> {
    let decision = state.billing.entitlements.resolve(user_id, feature).await?;
    enforce(decision, Some(feature))
}

/// Require headroom under a countable plan limit, e.g. linked bank accounts.
pub async fn require_capacity(
    state: &AppState,
    user_id: Uuid,
    kind: LimitKind,
    current: u32,
) -> ApiResult<Decision> {
    let decision = state
        .billing
        .entitlements
        .resolve_limit(user_id, kind, current)
        .await?;
    enforce(decision, None)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use locksum_billing::catalog::PlanCatalog;
    use locksum_billing::entitlement::decide_feature;
    use locksum_shared::{PlanTier, SubscriptionStatus};

    #[test]
    fn test_denied_decision_short_circuits() {
        let catalog = PlanCatalog::builtin();
        let decision = decide_feature(
            PlanTier::Free,
            SubscriptionStatus::None,
            Feature::AiInsights,
            &catalog,
        );

        // A denied decision must come back as a 402 error, not a value the
        // handler body could ever observe.
        let result = enforce(decision, Some(Feature::AiInsights));
        match result {
            Err(ApiError::EntitlementDenied { reason, detail }) => {
                assert_eq!(reason, DecisionReason::NotSubscribed);
                assert!(!detail.is_empty());
            }
            other => panic!("expected EntitlementDenied, got {other:?}"),
        }
    }

    #[test]
    fn test_granted_decision_passes_through() {
        let catalog = PlanCatalog::builtin();
        let decision = decide_feature(
            PlanTier::Plus,
            SubscriptionStatus::Active,
            Feature::AiInsights,
            &catalog,
        );

        let passed = enforce(decision, Some(Feature::AiInsights)).unwrap();
        assert!(passed.granted);
    }

    #[test]
    fn test_denial_detail_names_the_plan() {
        let catalog = PlanCatalog::builtin();
        let decision = decide_feature(
            PlanTier::Plus,
            SubscriptionStatus::Active,
            Feature::ExtraAccounts,
            &catalog,
        );
        let detail = denial_detail(&decision, Some(Feature::ExtraAccounts));
        assert!(detail.contains("plus"));
    }
}
