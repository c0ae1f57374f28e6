//! Webhook Reconciler
//!
//! Consumes asynchronous processor notifications, validates and deduplicates
//! them, and drives the lifecycle state machine. This is the one place where
//! true idempotence is mandatory: replaying the same notification any number
//! of times must converge to the same ledger state.
//!
//! Signature verification is done manually (HMAC-SHA256 over `"{t}.{payload}"`
//! with a `t=..,v1=..` header) so the inbound contract does not depend on the
//! async-stripe event API version.

use hmac::{Hmac, Mac};
use locksum_shared::SubscriptionStatus;
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::catalog::PlanCatalog;
use crate::client::StripeConfig;
use crate::error::{BillingError, BillingResult};
use crate::ledger::{SubscriptionLedger, SubscriptionRecord};
use crate::lifecycle::{transition, SubscriptionEvent};

type HmacSha256 = Hmac<Sha256>;

/// Signed timestamps older or newer than this are rejected (replay window).
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Bounded optimistic retries: one reload after a version conflict.
const MAX_APPLY_ATTEMPTS: u32 = 2;

/// Outcome of reconciling one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The event was applied; the ledger now shows the new status.
    Applied { status: SubscriptionStatus },
    /// The event id was already applied; the ledger is unchanged.
    Ignored,
    /// The notification was not applied and never will be.
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    InvalidSignature,
    MalformedPayload(String),
    UnknownSubscription(String),
    UnsupportedEvent(String),
    /// The event is older than the last one applied to the row.
    Stale,
    /// The state machine refused the transition.
    InvalidTransition(String),
}

/// A parsed processor notification: the reconciliation contract.
#[derive(Debug, Clone)]
pub struct Notification {
    pub event_id: String,
    pub event_type: String,
    pub created: OffsetDateTime,
    pub customer_id: String,
    pub subscription_id: Option<String>,
    pub price_id: Option<String>,
    pub trial: bool,
}

/// Verify a `t=<unix>,v1=<hex>` signature header against the raw payload.
pub fn verify_signature(
    secret: &str,
    header: &str,
    payload: &str,
    now: OffsetDateTime,
) -> Result<(), RejectReason> {
    let mut timestamp: Option<i64> = None;
    let mut signature: Option<String> = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse().ok(),
            Some(("v1", v)) => signature = Some(v.to_string()),
            _ => {}
        }
    }

    let (timestamp, signature) = match (timestamp, signature) {
        (Some(t), Some(s)) => (t, s),
        _ => return Err(RejectReason::InvalidSignature),
    };

    if (now.unix_timestamp() - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(RejectReason::InvalidSignature);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| RejectReason::InvalidSignature)?;
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    // Hex compare is fine here: the secret is high-entropy and the mac is
    // recomputed per request.
    if expected == signature.to_lowercase() {
        Ok(())
    } else {
        Err(RejectReason::InvalidSignature)
    }
}

/// Compute the signature header for a payload. Used by tests and tooling.
pub fn sign_payload(secret: &str, payload: &str, at: OffsetDateTime) -> String {
    let timestamp = at.unix_timestamp();
    // The secret is caller-provided; an empty key is still a valid HMAC key.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

/// Parse the notification envelope out of the raw JSON payload.
pub fn parse_notification(payload: &str) -> Result<Notification, RejectReason> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| RejectReason::MalformedPayload(e.to_string()))?;

    let event_id = value["id"]
        .as_str()
        .ok_or_else(|| RejectReason::MalformedPayload("missing event id".to_string()))?
        .to_string();
    let event_type = value["type"]
        .as_str()
        .ok_or_else(|| RejectReason::MalformedPayload("missing event type".to_string()))?
        .to_string();
    let created = value["created"]
        .as_i64()
        .and_then(|t| OffsetDateTime::from_unix_timestamp(t).ok())
        .ok_or_else(|| RejectReason::MalformedPayload("missing created timestamp".to_string()))?;

    let object = &value["data"]["object"];
    let customer_id = object["customer"]
        .as_str()
        .ok_or_else(|| RejectReason::MalformedPayload("missing customer reference".to_string()))?
        .to_string();

    // Subscription events carry the reference as the object id; invoice
    // events carry it in a `subscription` field.
    let subscription_id = object["subscription"]
        .as_str()
        .or_else(|| {
            if event_type.starts_with("customer.subscription.") {
                object["id"].as_str()
            } else {
                None
            }
        })
        .map(str::to_string);

    let price_id = object["items"]["data"][0]["price"]["id"]
        .as_str()
        .map(str::to_string);

    let trial = object["status"].as_str() == Some("trialing");

    Ok(Notification {
        event_id,
        event_type,
        created,
        customer_id,
        subscription_id,
        price_id,
        trial,
    })
}

/// Map a notification onto a lifecycle event. `None` means the event type is
/// not part of the reconciliation contract.
pub fn lifecycle_event(
    notification: &Notification,
    catalog_price: Option<(locksum_shared::PlanTier, locksum_shared::BillingInterval)>,
) -> Result<Option<SubscriptionEvent>, RejectReason> {
    let event = match notification.event_type.as_str() {
        "customer.subscription.created" => {
            let (plan, interval) = catalog_price.ok_or_else(|| {
                RejectReason::MalformedPayload(format!(
                    "unknown price on {}",
                    notification.event_id
                ))
            })?;
            Some(SubscriptionEvent::CheckoutCompleted {
                plan,
                interval,
                trial: notification.trial,
            })
        }
        "invoice.paid" => Some(SubscriptionEvent::Renewed),
        "invoice.payment_failed" => Some(SubscriptionEvent::PaymentFailed),
        "customer.subscription.deleted" => Some(SubscriptionEvent::Canceled),
        _ => None,
    };
    Ok(event)
}

/// Pure reconcile decision against a committed row: dedup, ordering, then the
/// state machine. No IO; this is what makes idempotence unit-testable.
pub fn decide(
    record: &SubscriptionRecord,
    notification: &Notification,
    event: &SubscriptionEvent,
    already_applied: bool,
) -> Result<SubscriptionStatus, Reconciliation> {
    if already_applied || record.last_event_id.as_deref() == Some(&notification.event_id) {
        return Err(Reconciliation::Ignored);
    }

    // Out-of-order protection: never apply an event older than the newest one
    // already on the row. Processor timestamps have one-second resolution, so
    // a distinct event landing in the same second is still fresh; the id
    // dedup above handles true duplicates.
    if let Some(last) = record.last_event_at {
        if notification.created < last {
            return Err(Reconciliation::Rejected(RejectReason::Stale));
        }
    }

    transition(record.status, event)
        .map_err(|e| Reconciliation::Rejected(RejectReason::InvalidTransition(e.to_string())))
}

/// The webhook reconciler service.
#[derive(Clone)]
pub struct WebhookReconciler {
    ledger: SubscriptionLedger,
    config: StripeConfig,
    catalog: Arc<PlanCatalog>,
}

impl WebhookReconciler {
    pub fn new(ledger: SubscriptionLedger, config: StripeConfig, catalog: Arc<PlanCatalog>) -> Self {
        Self {
            ledger,
            config,
            catalog,
        }
    }

    /// Reconcile one delivery. Returns `Err` only for transient storage
    /// conflicts that survived the bounded retry; the HTTP layer maps that to
    /// a retryable status for the processor.
    pub async fn reconcile(
        &self,
        signature_header: &str,
        payload: &str,
    ) -> BillingResult<Reconciliation> {
        if let Err(reason) = verify_signature(
            &self.config.webhook_secret,
            signature_header,
            payload,
            OffsetDateTime::now_utc(),
        ) {
            tracing::warn!("Webhook signature verification failed");
            return Ok(Reconciliation::Rejected(reason));
        }

        let notification = match parse_notification(payload) {
            Ok(n) => n,
            Err(reason) => return Ok(Reconciliation::Rejected(reason)),
        };

        let price = notification
            .price_id
            .as_deref()
            .and_then(|p| self.config.plan_for_price(p));

        let event = match lifecycle_event(&notification, price) {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::debug!(
                    event_type = %notification.event_type,
                    "Ignoring event type outside the reconciliation contract"
                );
                return Ok(Reconciliation::Rejected(RejectReason::UnsupportedEvent(
                    notification.event_type,
                )));
            }
            Err(reason) => return Ok(Reconciliation::Rejected(reason)),
        };

        // Make sure the checkout plan is actually in the catalog.
        if let SubscriptionEvent::CheckoutCompleted { plan, interval, .. } = &event {
            if !self.catalog.offers(*plan, *interval) {
                return Ok(Reconciliation::Rejected(RejectReason::MalformedPayload(
                    format!("plan {plan}/{interval} is not purchasable"),
                )));
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            let record = match self
                .ledger
                .load_by_customer_ref(&notification.customer_id)
                .await?
            {
                Some(record) => record,
                None => {
                    tracing::warn!(
                        customer_id = %notification.customer_id,
                        event_id = %notification.event_id,
                        "Webhook for unknown subscription"
                    );
                    return Ok(Reconciliation::Rejected(RejectReason::UnknownSubscription(
                        notification.customer_id,
                    )));
                }
            };

            let already_applied = self.ledger.event_applied(&notification.event_id).await?;

            if let Err(outcome) = decide(&record, &notification, &event, already_applied) {
                return Ok(outcome);
            }

            match self
                .ledger
                .apply_event(
                    &record,
                    &event,
                    &notification.event_id,
                    notification.created,
                    notification.subscription_id.as_deref(),
                )
                .await
            {
                Ok(status) => return Ok(Reconciliation::Applied { status }),
                Err(BillingError::ConcurrentModification(msg)) => {
                    if attempt >= MAX_APPLY_ATTEMPTS {
                        return Err(BillingError::ConcurrentModification(msg));
                    }
                    tracing::debug!(
                        event_id = %notification.event_id,
                        "Version conflict on reconcile, retrying against fresh row"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use locksum_shared::{BillingInterval, PlanTier};
    use time::Duration;
    use uuid::Uuid;

    fn record(status: SubscriptionStatus, last_event: Option<(&str, OffsetDateTime)>) -> SubscriptionRecord {
        SubscriptionRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan: PlanTier::Plus,
            plan_interval: BillingInterval::Monthly,
            status,
            processor_customer_id: Some("cus_1".to_string()),
            processor_subscription_id: Some("sub_1".to_string()),
            version: 3,
            last_event_id: last_event.map(|(id, _)| id.to_string()),
            last_event_at: last_event.map(|(_, at)| at),
        }
    }

    fn notification(event_id: &str, created: OffsetDateTime) -> Notification {
        Notification {
            event_id: event_id.to_string(),
            event_type: "invoice.paid".to_string(),
            created,
            customer_id: "cus_1".to_string(),
            subscription_id: Some("sub_1".to_string()),
            price_id: None,
            trial: false,
        }
    }

    #[test]
    fn signature_round_trip() {
        let now = OffsetDateTime::now_utc();
        let header = sign_payload("whsec_test", "{\"id\":\"evt_1\"}", now);
        assert!(verify_signature("whsec_test", &header, "{\"id\":\"evt_1\"}", now).is_ok());
    }

    #[test]
    fn signature_rejects_wrong_secret_and_tampered_payload() {
        let now = OffsetDateTime::now_utc();
        let header = sign_payload("whsec_test", "payload", now);
        assert_eq!(
            verify_signature("whsec_other", &header, "payload", now),
            Err(RejectReason::InvalidSignature)
        );
        assert_eq!(
            verify_signature("whsec_test", &header, "tampered", now),
            Err(RejectReason::InvalidSignature)
        );
        assert_eq!(
            verify_signature("whsec_test", "garbage", "payload", now),
            Err(RejectReason::InvalidSignature)
        );
    }

    #[test]
    fn signature_rejects_outside_tolerance() {
        let now = OffsetDateTime::now_utc();
        let header = sign_payload("whsec_test", "payload", now - Duration::seconds(600));
        assert_eq!(
            verify_signature("whsec_test", &header, "payload", now),
            Err(RejectReason::InvalidSignature)
        );
    }

    #[test]
    fn parses_subscription_event_payload() {
        let payload = serde_json::json!({
            "id": "evt_42",
            "type": "customer.subscription.created",
            "created": 1_700_000_000,
            "data": {"object": {
                "id": "sub_9",
                "customer": "cus_9",
                "status": "trialing",
                "items": {"data": [{"price": {"id": "price_plus_m",
                    "recurring": {"interval": "month"}}}]}
            }}
        })
        .to_string();

        let n = parse_notification(&payload).unwrap();
        assert_eq!(n.event_id, "evt_42");
        assert_eq!(n.customer_id, "cus_9");
        assert_eq!(n.subscription_id.as_deref(), Some("sub_9"));
        assert_eq!(n.price_id.as_deref(), Some("price_plus_m"));
        assert!(n.trial);
    }

    #[test]
    fn parses_invoice_event_payload() {
        let payload = serde_json::json!({
            "id": "evt_43",
            "type": "invoice.payment_failed",
            "created": 1_700_000_100,
            "data": {"object": {
                "id": "in_1",
                "customer": "cus_9",
                "subscription": "sub_9"
            }}
        })
        .to_string();

        let n = parse_notification(&payload).unwrap();
        assert_eq!(n.subscription_id.as_deref(), Some("sub_9"));
        let event = lifecycle_event(&n, None).unwrap().unwrap();
        assert_eq!(event, SubscriptionEvent::PaymentFailed);
    }

    #[test]
    fn malformed_payload_is_rejected() {
        assert!(matches!(
            parse_notification("not json"),
            Err(RejectReason::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_notification("{\"id\": \"evt_1\"}"),
            Err(RejectReason::MalformedPayload(_))
        ));
    }

    #[test]
    fn duplicate_event_is_ignored() {
        let now = OffsetDateTime::now_utc();
        let row = record(SubscriptionStatus::Active, Some(("evt_1", now)));
        let n = notification("evt_1", now + Duration::minutes(1));

        // Same id as last applied: idempotent no matter how often it replays.
        for _ in 0..3 {
            assert_eq!(
                decide(&row, &n, &SubscriptionEvent::Renewed, false),
                Err(Reconciliation::Ignored)
            );
        }

        // Dedup table hit works the same way for older ids.
        let n2 = notification("evt_0", now + Duration::minutes(1));
        assert_eq!(
            decide(&row, &n2, &SubscriptionEvent::Renewed, true),
            Err(Reconciliation::Ignored)
        );
    }

    #[test]
    fn stale_event_never_regresses_status() {
        let now = OffsetDateTime::now_utc();
        // A renewal was applied at `now`; a stale checkout-created duplicate
        // from a minute earlier must not rewind the row.
        let row = record(SubscriptionStatus::Active, Some(("evt_new", now)));
        let stale = notification("evt_old", now - Duration::minutes(1));

        assert_eq!(
            decide(&row, &stale, &SubscriptionEvent::Renewed, false),
            Err(Reconciliation::Rejected(RejectReason::Stale))
        );
    }

    #[test]
    fn same_second_distinct_event_is_applied() {
        let now = OffsetDateTime::now_utc();
        // invoice.paid and invoice.payment_failed can share a one-second
        // timestamp; the second event is distinct and must still apply.
        let row = record(SubscriptionStatus::Active, Some(("evt_paid", now)));
        let n = notification("evt_failed", now);

        assert_eq!(
            decide(&row, &n, &SubscriptionEvent::PaymentFailed, false),
            Ok(SubscriptionStatus::PastDue)
        );
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let now = OffsetDateTime::now_utc();
        let row = record(SubscriptionStatus::Canceled, Some(("evt_1", now)));
        let n = notification("evt_2", now + Duration::minutes(1));

        assert!(matches!(
            decide(&row, &n, &SubscriptionEvent::Renewed, false),
            Err(Reconciliation::Rejected(RejectReason::InvalidTransition(_)))
        ));
    }

    #[test]
    fn fresh_event_passes_through_to_state_machine() {
        let now = OffsetDateTime::now_utc();
        let row = record(SubscriptionStatus::PastDue, Some(("evt_1", now)));
        let n = notification("evt_2", now + Duration::minutes(1));

        assert_eq!(
            decide(&row, &n, &SubscriptionEvent::Renewed, false),
            Ok(SubscriptionStatus::Active)
        );
    }
}
