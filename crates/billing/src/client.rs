//! Stripe client configuration

use locksum_shared::{BillingInterval, PlanTier};
use stripe::Client;

use crate::error::{BillingError, BillingResult};

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Webhook signing secret
    pub webhook_secret: String,
    /// Price IDs for each paid plan/interval combination
    pub price_ids: PriceIds,
    /// Frontend base URL for success/cancel redirects
    pub app_base_url: String,
}

/// Processor price IDs for the paid plan tiers.
/// Plan hierarchy: free (no price) → plus → pro.
#[derive(Debug, Clone)]
pub struct PriceIds {
    pub plus_monthly: String,
    pub plus_yearly: String,
    pub pro_monthly: String,
    pub pro_yearly: String,
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?,
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?,
            price_ids: PriceIds {
                plus_monthly: std::env::var("STRIPE_PRICE_PLUS_MONTHLY").map_err(|_| {
                    BillingError::Config("STRIPE_PRICE_PLUS_MONTHLY not set".to_string())
                })?,
                plus_yearly: std::env::var("STRIPE_PRICE_PLUS_YEARLY").map_err(|_| {
                    BillingError::Config("STRIPE_PRICE_PLUS_YEARLY not set".to_string())
                })?,
                pro_monthly: std::env::var("STRIPE_PRICE_PRO_MONTHLY").map_err(|_| {
                    BillingError::Config("STRIPE_PRICE_PRO_MONTHLY not set".to_string())
                })?,
                pro_yearly: std::env::var("STRIPE_PRICE_PRO_YEARLY").map_err(|_| {
                    BillingError::Config("STRIPE_PRICE_PRO_YEARLY not set".to_string())
                })?,
            },
            app_base_url: std::env::var("FRONTEND_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
        })
    }

    /// Get the price ID for a paid plan/interval combination.
    /// Free has no price; requesting one is a caller error.
    pub fn price_id_for(&self, plan: PlanTier, interval: BillingInterval) -> Option<&str> {
        match (plan, interval) {
            (PlanTier::Plus, BillingInterval::Monthly) => Some(&self.price_ids.plus_monthly),
            (PlanTier::Plus, BillingInterval::Yearly) => Some(&self.price_ids.plus_yearly),
            (PlanTier::Pro, BillingInterval::Monthly) => Some(&self.price_ids.pro_monthly),
            (PlanTier::Pro, BillingInterval::Yearly) => Some(&self.price_ids.pro_yearly),
            (PlanTier::Free, _) => None,
        }
    }

    /// Map a processor price ID back to the plan/interval it sells.
    pub fn plan_for_price(&self, price_id: &str) -> Option<(PlanTier, BillingInterval)> {
        if price_id == self.price_ids.plus_monthly {
            Some((PlanTier::Plus, BillingInterval::Monthly))
        } else if price_id == self.price_ids.plus_yearly {
            Some((PlanTier::Plus, BillingInterval::Yearly))
        } else if price_id == self.price_ids.pro_monthly {
            Some((PlanTier::Pro, BillingInterval::Monthly))
        } else if price_id == self.price_ids.pro_yearly {
            Some((PlanTier::Pro, BillingInterval::Yearly))
        } else {
            None
        }
    }
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(config.secret_key.clone());
        Self { client, config }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> StripeConfig {
    StripeConfig {
        secret_key: "sk_test_x".to_string(),
        webhook_secret: "whsec_test".to_string(),
        price_ids: PriceIds {
            plus_monthly: "price_plus_m".to_string(),
            plus_yearly: "price_plus_y".to_string(),
            pro_monthly: "price_pro_m".to_string(),
            pro_yearly: "price_pro_y".to_string(),
        },
        app_base_url: "http://localhost:5173".to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn price_lookup_round_trips() {
        let config = test_config();
        for plan in [PlanTier::Plus, PlanTier::Pro] {
            for interval in [BillingInterval::Monthly, BillingInterval::Yearly] {
                let price = config.price_id_for(plan, interval).unwrap().to_string();
                assert_eq!(config.plan_for_price(&price), Some((plan, interval)));
            }
        }
    }

    #[test]
    fn free_has_no_price() {
        let config = test_config();
        assert!(config.price_id_for(PlanTier::Free, BillingInterval::Monthly).is_none());
        assert!(config.plan_for_price("price_unknown").is_none());
    }
}
