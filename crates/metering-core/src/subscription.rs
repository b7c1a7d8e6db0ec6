//! The subscription state machine.
//!
//! [`transition`] is a pure, total function from a billing event and the
//! current account row to either a new row or a [`DropReason`]. It performs
//! no I/O; `metering-store` invokes it inside the same serialized section
//! that checks the idempotency record and writes the result, so the check
//! and the side effects land atomically.
//!
//! Events arrive at-least-once and unordered. No event carries a logical
//! clock, so ordering is not reconstructed; every transition is written to be
//! safe under duplication (guarded by the event record) and under staleness
//! (a reference the account has moved past is dropped, not an error).

use chrono::{DateTime, Duration, Utc};

use crate::account::{Account, Plan, SubscriptionStatus};
use crate::event::BillingEvent;
use crate::pricing::PlanTable;

/// Fallback billing-period length when the processor omits the period end.
const DEFAULT_PERIOD_DAYS: i64 = 30;

/// Why an event produced no state change.
///
/// Dropped events are logged and acknowledged, never surfaced as errors:
/// the processor redelivers on error responses, and a stale event will stay
/// stale forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The event references a subscription the account does not hold.
    StaleReference,

    /// The price identifier is not in the plan table.
    UnknownPriceTier(String),

    /// A checkout completed while a paid subscription is already active;
    /// a second paid subscription is rejected, not merged.
    DuplicateSubscription,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaleReference => write!(f, "stale or unknown subscription reference"),
            Self::UnknownPriceTier(price_id) => write!(f, "unknown price tier: {price_id}"),
            Self::DuplicateSubscription => write!(f, "account already has an active subscription"),
        }
    }
}

/// Outcome of applying one billing event to one account.
pub type Transition = Result<Account, DropReason>;

/// Apply a billing event to an account, producing the new row.
///
/// The returned row always satisfies `0 <= credits_remaining <=
/// credits_total`; mid-cycle plan changes clamp the remaining balance to the
/// new total rather than granting or silently exceeding it.
pub fn transition(
    account: &Account,
    event: &BillingEvent,
    plans: &PlanTable,
    now: DateTime<Utc>,
) -> Transition {
    // Non-checkout events must reference the subscription the account holds.
    if let Some(subscription_ref) = event.subscription_ref() {
        if account.active_subscription_ref.as_deref() != Some(subscription_ref) {
            return Err(DropReason::StaleReference);
        }
    }

    let mut next = account.clone();
    next.updated_at = now;

    match event {
        BillingEvent::CheckoutCompleted {
            subject,
            subscription_ref,
            price_id,
            period_end,
            ..
        } => {
            if account.has_active_subscription() {
                return Err(DropReason::DuplicateSubscription);
            }
            let spec = plans
                .resolve(price_id)
                .ok_or_else(|| DropReason::UnknownPriceTier(price_id.clone()))?;

            next.plan = spec.plan;
            next.subscription_status = SubscriptionStatus::Active;
            next.credits_total = spec.allotment;
            next.credits_remaining = spec.allotment;
            next.credits_reset_at = Some(period_end_or_default(*period_end, now));
            next.billing_subject_id = Some(subject.clone());
            next.active_subscription_ref = Some(subscription_ref.clone());
        }

        BillingEvent::SubscriptionUpdated {
            price_id,
            period_end,
            status,
            ..
        } => {
            let spec = plans
                .resolve(price_id)
                .ok_or_else(|| DropReason::UnknownPriceTier(price_id.clone()))?;

            next.plan = spec.plan;
            next.credits_total = spec.allotment;
            // Mid-cycle plan changes do not grant credits; only renewal does.
            // A downgrade clamps the balance so the invariant holds.
            next.credits_remaining = next.credits_remaining.min(spec.allotment);
            next.credits_reset_at = Some(period_end_or_default(*period_end, now));
            // Unknown processor statuses keep the current status rather than
            // guessing; the next recognized event corrects it.
            if let Some(mapped) = SubscriptionStatus::from_processor(status) {
                next.subscription_status = mapped;
            }
        }

        BillingEvent::InvoicePaid {
            price_id,
            period_end,
            ..
        } => {
            let spec = plans
                .resolve(price_id)
                .ok_or_else(|| DropReason::UnknownPriceTier(price_id.clone()))?;

            // The monthly renewal: the only transition allowed to restore
            // credits_remaining to full.
            next.credits_total = spec.allotment;
            next.credits_remaining = spec.allotment;
            next.credits_reset_at = Some(period_end_or_default(*period_end, now));
        }

        BillingEvent::InvoicePaymentFailed { .. } => {
            // Grace period: plan and credits untouched, consumption still
            // allowed on this transition alone.
            next.subscription_status = SubscriptionStatus::PastDue;
        }

        BillingEvent::SubscriptionDeleted { .. } => {
            next.plan = Plan::Free;
            next.subscription_status = SubscriptionStatus::Canceled;
            next.credits_total = Plan::Free.allotment();
            next.credits_remaining = Plan::Free.allotment();
            next.credits_reset_at = None;
            next.active_subscription_ref = None;
        }
    }

    debug_assert!(next.invariant_holds());
    Ok(next)
}

fn period_end_or_default(period_end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    period_end.unwrap_or(now + Duration::days(DEFAULT_PERIOD_DAYS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccountId;

    fn plans() -> PlanTable {
        PlanTable::new([
            ("price_standard".to_string(), Plan::Standard),
            ("price_premium".to_string(), Plan::Premium),
        ])
        .unwrap()
    }

    fn checkout(price_id: &str) -> BillingEvent {
        BillingEvent::CheckoutCompleted {
            event_id: "evt_checkout".into(),
            account_id: AccountId::generate(),
            subject: "cus_1".into(),
            subscription_ref: "sub_1".into(),
            price_id: price_id.into(),
            period_end: None,
        }
    }

    fn subscribed_account() -> Account {
        let mut account = Account::new(AccountId::generate());
        account = transition(&account, &checkout("price_standard"), &plans(), Utc::now()).unwrap();
        account
    }

    #[test]
    fn checkout_activates_standard_plan() {
        let account = Account::new(AccountId::generate());
        let now = Utc::now();
        let next = transition(&account, &checkout("price_standard"), &plans(), now).unwrap();

        assert_eq!(next.plan, Plan::Standard);
        assert_eq!(next.subscription_status, SubscriptionStatus::Active);
        assert_eq!(next.credits_total, Plan::Standard.allotment());
        assert_eq!(next.credits_remaining, Plan::Standard.allotment());
        assert_eq!(next.active_subscription_ref.as_deref(), Some("sub_1"));
        assert_eq!(next.billing_subject_id.as_deref(), Some("cus_1"));
        assert_eq!(
            next.credits_reset_at,
            Some(now + Duration::days(DEFAULT_PERIOD_DAYS))
        );
    }

    #[test]
    fn checkout_honors_processor_period_end() {
        let account = Account::new(AccountId::generate());
        let now = Utc::now();
        let period_end = now + Duration::days(31);
        let event = BillingEvent::CheckoutCompleted {
            event_id: "evt".into(),
            account_id: account.account_id.clone(),
            subject: "cus_1".into(),
            subscription_ref: "sub_1".into(),
            price_id: "price_premium".into(),
            period_end: Some(period_end),
        };
        let next = transition(&account, &event, &plans(), now).unwrap();
        assert_eq!(next.credits_reset_at, Some(period_end));
        assert_eq!(next.plan, Plan::Premium);
    }

    #[test]
    fn second_checkout_is_rejected_not_merged() {
        let account = subscribed_account();
        let result = transition(&account, &checkout("price_premium"), &plans(), Utc::now());
        assert_eq!(result, Err(DropReason::DuplicateSubscription));
    }

    #[test]
    fn checkout_with_unknown_price_is_dropped() {
        let account = Account::new(AccountId::generate());
        let result = transition(&account, &checkout("price_bogus"), &plans(), Utc::now());
        assert!(matches!(result, Err(DropReason::UnknownPriceTier(_))));
    }

    #[test]
    fn update_changes_plan_without_granting_credits() {
        let mut account = subscribed_account();
        account.credits_remaining = 40;

        let event = BillingEvent::SubscriptionUpdated {
            event_id: "evt_up".into(),
            subscription_ref: "sub_1".into(),
            price_id: "price_premium".into(),
            period_end: None,
            status: "active".into(),
        };
        let next = transition(&account, &event, &plans(), Utc::now()).unwrap();

        assert_eq!(next.plan, Plan::Premium);
        assert_eq!(next.credits_total, Plan::Premium.allotment());
        // Upgrade does not top the balance up; only renewal does.
        assert_eq!(next.credits_remaining, 40);
    }

    #[test]
    fn downgrade_clamps_remaining_to_new_total() {
        let mut account = subscribed_account();
        // Move to premium first so a downgrade can strand a high balance.
        let upgrade = BillingEvent::SubscriptionUpdated {
            event_id: "evt_up".into(),
            subscription_ref: "sub_1".into(),
            price_id: "price_premium".into(),
            period_end: None,
            status: "active".into(),
        };
        account = transition(&account, &upgrade, &plans(), Utc::now()).unwrap();
        account.credits_remaining = 300;

        let downgrade = BillingEvent::SubscriptionUpdated {
            event_id: "evt_down".into(),
            subscription_ref: "sub_1".into(),
            price_id: "price_standard".into(),
            period_end: None,
            status: "active".into(),
        };
        let next = transition(&account, &downgrade, &plans(), Utc::now()).unwrap();

        assert_eq!(next.credits_total, Plan::Standard.allotment());
        assert_eq!(next.credits_remaining, Plan::Standard.allotment());
        assert!(next.invariant_holds());
    }

    #[test]
    fn unknown_processor_status_keeps_current() {
        let account = subscribed_account();
        let event = BillingEvent::SubscriptionUpdated {
            event_id: "evt_up".into(),
            subscription_ref: "sub_1".into(),
            price_id: "price_standard".into(),
            period_end: None,
            status: "incomplete_expired".into(),
        };
        let next = transition(&account, &event, &plans(), Utc::now()).unwrap();
        assert_eq!(next.subscription_status, SubscriptionStatus::Active);
    }

    #[test]
    fn renewal_restores_full_balance() {
        let mut account = subscribed_account();
        account.credits_remaining = 3;

        let event = BillingEvent::InvoicePaid {
            event_id: "evt_paid".into(),
            subscription_ref: "sub_1".into(),
            price_id: "price_standard".into(),
            period_end: None,
        };
        let next = transition(&account, &event, &plans(), Utc::now()).unwrap();

        assert_eq!(next.credits_remaining, next.credits_total);
        assert_eq!(next.credits_total, Plan::Standard.allotment());
    }

    #[test]
    fn payment_failure_enters_grace_period() {
        let mut account = subscribed_account();
        account.credits_remaining = 7;

        let event = BillingEvent::InvoicePaymentFailed {
            event_id: "evt_fail".into(),
            subscription_ref: "sub_1".into(),
        };
        let next = transition(&account, &event, &plans(), Utc::now()).unwrap();

        assert_eq!(next.subscription_status, SubscriptionStatus::PastDue);
        // Plan and credits untouched in the grace period.
        assert_eq!(next.plan, Plan::Standard);
        assert_eq!(next.credits_remaining, 7);
    }

    #[test]
    fn deletion_reverts_to_free_tier() {
        let account = subscribed_account();
        let event = BillingEvent::SubscriptionDeleted {
            event_id: "evt_del".into(),
            subscription_ref: "sub_1".into(),
        };
        let next = transition(&account, &event, &plans(), Utc::now()).unwrap();

        assert_eq!(next.plan, Plan::Free);
        assert_eq!(next.subscription_status, SubscriptionStatus::Canceled);
        assert_eq!(next.credits_total, Plan::Free.allotment());
        assert_eq!(next.credits_remaining, Plan::Free.allotment());
        assert!(next.credits_reset_at.is_none());
        assert!(next.active_subscription_ref.is_none());
        // The processor customer link survives cancellation for re-checkout.
        assert_eq!(next.billing_subject_id.as_deref(), Some("cus_1"));
    }

    #[test]
    fn stale_subscription_ref_is_dropped() {
        let account = subscribed_account();
        let event = BillingEvent::InvoicePaid {
            event_id: "evt_stale".into(),
            subscription_ref: "sub_old".into(),
            price_id: "price_standard".into(),
            period_end: None,
        };
        let result = transition(&account, &event, &plans(), Utc::now());
        assert_eq!(result, Err(DropReason::StaleReference));
    }

    #[test]
    fn events_against_free_account_are_stale() {
        let account = Account::new(AccountId::generate());
        let event = BillingEvent::SubscriptionDeleted {
            event_id: "evt_del".into(),
            subscription_ref: "sub_never".into(),
        };
        assert_eq!(
            transition(&account, &event, &plans(), Utc::now()),
            Err(DropReason::StaleReference)
        );
    }
}
