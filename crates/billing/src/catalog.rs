//! Plan Catalog
//!
//! Static table of plan tiers and the features/limits each tier grants.
//! Loaded once at process start; changing it is a deployment, not a request.
//! The catalog must satisfy a superset invariant: every feature and limit a
//! lower tier grants is also granted by every higher tier.

use locksum_shared::{BillingInterval, Feature, LimitKind, PlanTier};

use crate::client::StripeConfig;
use crate::error::{BillingError, BillingResult};

/// A single catalog entry, immutable at runtime.
#[derive(Debug, Clone)]
pub struct PlanSpec {
    pub tier: PlanTier,
    pub features: &'static [Feature],
    pub intervals: &'static [BillingInterval],
    pub max_linked_accounts: u32,
}

/// The plan catalog.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: Vec<PlanSpec>,
}

impl PlanCatalog {
    /// The shipped catalog: free < plus < pro.
    pub fn builtin() -> Self {
        Self {
            plans: vec![
                PlanSpec {
                    tier: PlanTier::Free,
                    features: &[],
                    intervals: &[],
                    max_linked_accounts: 0,
                },
                PlanSpec {
                    tier: PlanTier::Plus,
                    features: &[Feature::BankLink, Feature::AiInsights],
                    intervals: &[BillingInterval::Monthly, BillingInterval::Yearly],
                    max_linked_accounts: 3,
                },
                PlanSpec {
                    tier: PlanTier::Pro,
                    features: &[Feature::BankLink, Feature::AiInsights, Feature::ExtraAccounts],
                    intervals: &[BillingInterval::Monthly, BillingInterval::Yearly],
                    max_linked_accounts: 10,
                },
            ],
        }
    }

    // Every tier variant has an entry; builtin() is exhaustive over PlanTier.
    #[allow(clippy::expect_used)]
    fn spec(&self, tier: PlanTier) -> &PlanSpec {
        self.plans
            .iter()
            .find(|p| p.tier == tier)
            .expect("catalog covers every tier")
    }

    /// The features granted by a tier.
    pub fn features_of(&self, tier: PlanTier) -> &'static [Feature] {
        self.spec(tier).features
    }

    /// Whether a tier grants a specific feature.
    pub fn grants(&self, tier: PlanTier, feature: Feature) -> bool {
        self.features_of(tier).contains(&feature)
    }

    /// The numeric limit a tier imposes for a limit kind.
    pub fn limit_of(&self, tier: PlanTier, kind: LimitKind) -> u32 {
        match kind {
            LimitKind::LinkedAccounts => self.spec(tier).max_linked_accounts,
        }
    }

    /// Whether a plan/interval combination is purchasable.
    pub fn offers(&self, tier: PlanTier, interval: BillingInterval) -> bool {
        self.spec(tier).intervals.contains(&interval)
    }

    /// Startup validation: tier order must be a feature/limit superset chain,
    /// and every purchasable plan/interval must have a configured price id.
    /// A violation is a configuration fault, fatal at startup.
    pub fn validate(&self, stripe: &StripeConfig) -> BillingResult<()> {
        for pair in PlanTier::ALL.windows(2) {
            let (lower, higher) = (pair[0], pair[1]);
            for feature in self.features_of(lower) {
                if !self.grants(higher, *feature) {
                    return Err(BillingError::Config(format!(
                        "catalog invariant violated: {higher} lacks {feature} granted by {lower}"
                    )));
                }
            }
            if self.limit_of(higher, LimitKind::LinkedAccounts)
                < self.limit_of(lower, LimitKind::LinkedAccounts)
            {
                return Err(BillingError::Config(format!(
                    "catalog invariant violated: {higher} linked-account limit below {lower}"
                )));
            }
        }

        for plan in self.plans.iter() {
            for interval in plan.intervals {
                if stripe.price_id_for(plan.tier, *interval).is_none() {
                    return Err(BillingError::Config(format!(
                        "no price configured for {}/{}",
                        plan.tier, interval
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::client::test_config;

    #[test]
    fn builtin_catalog_validates() {
        PlanCatalog::builtin().validate(&test_config()).unwrap();
    }

    #[test]
    fn higher_tiers_are_feature_supersets() {
        let catalog = PlanCatalog::builtin();
        for pair in PlanTier::ALL.windows(2) {
            for feature in catalog.features_of(pair[0]) {
                assert!(
                    catalog.grants(pair[1], *feature),
                    "{} should grant {} because {} does",
                    pair[1],
                    feature,
                    pair[0]
                );
            }
        }
    }

    #[test]
    fn limits_grow_with_tier() {
        let catalog = PlanCatalog::builtin();
        assert_eq!(catalog.limit_of(PlanTier::Free, LimitKind::LinkedAccounts), 0);
        assert!(
            catalog.limit_of(PlanTier::Pro, LimitKind::LinkedAccounts)
                > catalog.limit_of(PlanTier::Plus, LimitKind::LinkedAccounts)
        );
    }

    #[test]
    fn free_is_not_purchasable() {
        let catalog = PlanCatalog::builtin();
        assert!(!catalog.offers(PlanTier::Free, BillingInterval::Monthly));
        assert!(catalog.offers(PlanTier::Plus, BillingInterval::Yearly));
    }

    #[test]
    fn feature_grants() {
        let catalog = PlanCatalog::builtin();
        assert!(!catalog.grants(PlanTier::Free, Feature::AiInsights));
        assert!(catalog.grants(PlanTier::Plus, Feature::BankLink));
        assert!(!catalog.grants(PlanTier::Plus, Feature::ExtraAccounts));
        assert!(catalog.grants(PlanTier::Pro, Feature::ExtraAccounts));
    }
}
