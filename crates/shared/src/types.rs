//! Common types used across Locksum
//!
//! The plan tier, lifecycle status, and feature identifiers are closed
//! enumerations: an invalid value is not representable past the parsing
//! boundary, so the ledger can never persist an unknown status.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

// =============================================================================
// Plan tiers
// =============================================================================

/// Plan tier. Tiers form a total order by feature superset: free < plus < pro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Plus,
    Pro,
}

impl Default for PlanTier {
    fn default() -> Self {
        Self::Free
    }
}

impl PlanTier {
    /// Position in the tier order. Used for `is_at_least` comparisons.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Free => 0,
            Self::Plus => 1,
            Self::Pro => 2,
        }
    }

    /// True if this tier is `other` or higher in the plan order.
    pub fn is_at_least(&self, other: PlanTier) -> bool {
        self.rank() >= other.rank()
    }

    pub const ALL: [PlanTier; 3] = [PlanTier::Free, PlanTier::Plus, PlanTier::Pro];
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Plus => write!(f, "plus"),
            Self::Pro => write!(f, "pro"),
        }
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "plus" => Ok(Self::Plus),
            "pro" => Ok(Self::Pro),
            other => Err(format!("unknown plan tier: {other}")),
        }
    }
}

// =============================================================================
// Billing interval
// =============================================================================

/// Billing interval for paid subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    #[default]
    Monthly,
    Yearly,
}

impl BillingInterval {
    /// Parse a processor recurring-interval value ("month" / "year").
    pub fn from_processor(s: &str) -> Option<Self> {
        match s {
            "month" => Some(Self::Monthly),
            "year" => Some(Self::Yearly),
            _ => None,
        }
    }
}

impl std::fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monthly => write!(f, "monthly"),
            Self::Yearly => write!(f, "yearly"),
        }
    }
}

impl FromStr for BillingInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monthly" | "month" => Ok(Self::Monthly),
            "yearly" | "annual" | "year" => Ok(Self::Yearly),
            other => Err(format!("unknown billing interval: {other}")),
        }
    }
}

// =============================================================================
// Subscription lifecycle status
// =============================================================================

/// Subscription lifecycle status.
///
/// `None` means the user has never completed a checkout. `Canceled` is
/// terminal for the current cycle; a fresh checkout starts a new cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    None,
    Trialing,
    Active,
    PastDue,
    Canceled,
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self::None
    }
}

impl SubscriptionStatus {
    /// Only `active` and `trialing` count as entitled; every other status
    /// denies paid features regardless of tier.
    pub fn is_entitled(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Trialing => write!(f, "trialing"),
            Self::Active => write!(f, "active"),
            Self::PastDue => write!(f, "past_due"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

// =============================================================================
// Features and limits
// =============================================================================

/// Premium capabilities. A feature exists only by appearing in a plan's
/// granted set; it has no lifecycle of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    BankLink,
    AiInsights,
    ExtraAccounts,
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BankLink => write!(f, "bank_link"),
            Self::AiInsights => write!(f, "ai_insights"),
            Self::ExtraAccounts => write!(f, "extra_accounts"),
        }
    }
}

/// Numeric limit classes attached to plan tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    LinkedAccounts,
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LinkedAccounts => write!(f, "linked_accounts"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_order_is_total() {
        assert!(PlanTier::Pro.is_at_least(PlanTier::Plus));
        assert!(PlanTier::Plus.is_at_least(PlanTier::Free));
        assert!(PlanTier::Pro.is_at_least(PlanTier::Pro));
        assert!(!PlanTier::Free.is_at_least(PlanTier::Plus));
    }

    #[test]
    fn tier_parse_round_trip() {
        for tier in PlanTier::ALL {
            assert_eq!(tier.to_string().parse::<PlanTier>(), Ok(tier));
        }
        assert!("enterprise".parse::<PlanTier>().is_err());
    }

    #[test]
    fn entitled_statuses() {
        assert!(SubscriptionStatus::Active.is_entitled());
        assert!(SubscriptionStatus::Trialing.is_entitled());
        assert!(!SubscriptionStatus::None.is_entitled());
        assert!(!SubscriptionStatus::PastDue.is_entitled());
        assert!(!SubscriptionStatus::Canceled.is_entitled());
    }

    #[test]
    fn status_display_uses_snake_case() {
        assert_eq!(SubscriptionStatus::PastDue.to_string(), "past_due");
        assert_eq!(SubscriptionStatus::None.to_string(), "none");
    }

    #[test]
    fn interval_parses_processor_values() {
        assert_eq!(
            BillingInterval::from_processor("month"),
            Some(BillingInterval::Monthly)
        );
        assert_eq!(
            BillingInterval::from_processor("year"),
            Some(BillingInterval::Yearly)
        );
        assert_eq!(BillingInterval::from_processor("week"), None);
        assert_eq!("annual".parse::<BillingInterval>(), Ok(BillingInterval::Yearly));
    }
}
