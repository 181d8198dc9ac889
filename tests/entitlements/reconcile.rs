//! Tests for deriving the stored entitlement from reported purchases.

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Months, TimeZone, Utc};

#[path = "../common/mod.rs"]
mod common;
use common::*;

use common::PurchaseStatus::*;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 16, 12, 0, 0).unwrap()
}

#[test]
fn test_highest_tier_wins_with_its_own_period() {
    let reconciler = Reconciler::new(test_store());
    let purchases = vec![
        PurchaseRecord::new([PREMIUM_MONTHLY], Completed),
        PurchaseRecord::new([PREMIUM_PLUS_YEARLY], Completed),
    ];

    let outcome = reconciler.reconcile(&purchases, now()).unwrap().outcome;

    assert_eq!(
        outcome,
        Reconciliation::Granted(SubscriptionTier::PremiumPlusYearly)
    );
    let record = reconciler.store().read();
    assert_eq!(record.tier, SubscriptionTier::PremiumPlusYearly);
    assert_eq!(
        record.expires_at,
        Some((now() + Months::new(12)).timestamp())
    );
}

#[test]
fn test_pending_only_report_leaves_store_untouched() {
    let reconciler = Reconciler::new(test_store());
    reconciler
        .reconcile(&[PurchaseRecord::new([PREMIUM_MONTHLY], Completed)], now())
        .unwrap();
    let before = reconciler.store().read();

    let later = now() + chrono::Duration::days(3);
    let outcome = reconciler
        .reconcile(&[PurchaseRecord::new([PREMIUM_PLUS_YEARLY], Pending)], later)
        .unwrap()
        .outcome;

    assert_eq!(outcome, Reconciliation::Unchanged);
    assert_eq!(reconciler.store().read(), before);
}

#[test]
fn test_empty_report_revokes_to_free() {
    let reconciler = Reconciler::new(test_store());
    reconciler
        .reconcile(&[PurchaseRecord::new([PREMIUM_YEARLY], Completed)], now())
        .unwrap();

    let outcome = reconciler.reconcile(&[], now()).unwrap().outcome;

    assert_eq!(outcome, Reconciliation::Revoked);
    assert_eq!(reconciler.store().read(), EntitlementRecord::free());
}

#[test]
fn test_completed_non_subscription_purchase_revokes() {
    let reconciler = Reconciler::new(test_store());
    reconciler
        .reconcile(&[PurchaseRecord::new([PREMIUM_YEARLY], Completed)], now())
        .unwrap();

    let outcome = reconciler
        .reconcile(
            &[PurchaseRecord::new(["zenfit_sleep_sounds_pack"], Completed)],
            now(),
        )
        .unwrap()
        .outcome;

    assert_eq!(outcome, Reconciliation::Revoked);
    assert_eq!(reconciler.store().read().tier, SubscriptionTier::Free);
}

#[test]
fn test_reconcile_is_idempotent() {
    let reconciler = Reconciler::new(test_store());
    let purchases = vec![
        PurchaseRecord::new([PREMIUM_YEARLY], Completed),
        PurchaseRecord::new([PREMIUM_PLUS_MONTHLY], Cancelled),
    ];

    let first = reconciler.reconcile(&purchases, now()).unwrap();
    let after_first = reconciler.store().read();
    let second = reconciler.reconcile(&purchases, now()).unwrap();

    assert_eq!(first, second);
    assert_eq!(reconciler.store().read(), after_first);
    assert_eq!(after_first.tier, SubscriptionTier::PremiumYearly);
}

#[test]
fn test_unprefixed_product_ids_are_recognized() {
    let reconciler = Reconciler::new(test_store());

    let outcome = reconciler
        .reconcile(
            &[PurchaseRecord::new(["premium_plus_monthly"], Completed)],
            now(),
        )
        .unwrap()
        .outcome;

    assert_eq!(
        outcome,
        Reconciliation::Granted(SubscriptionTier::PremiumPlusMonthly)
    );
}

#[test]
fn test_simulate_uses_the_same_mapping() {
    let reconciler = Reconciler::new(test_store());

    reconciler
        .simulate(SubscriptionTier::PremiumMonthly, now())
        .unwrap();
    let record = reconciler.store().read();
    assert_eq!(record.tier, SubscriptionTier::PremiumMonthly);
    assert_eq!(
        record.expires_at,
        Some((now() + Months::new(1)).timestamp())
    );

    reconciler.simulate(SubscriptionTier::Free, now()).unwrap();
    assert_eq!(reconciler.store().read(), EntitlementRecord::free());
}

#[test]
fn test_concurrent_reconciles_leave_a_consistent_record() {
    let reconciler = Arc::new(Reconciler::new(test_store()));
    let tiers = [
        SubscriptionTier::PremiumMonthly,
        SubscriptionTier::PremiumYearly,
        SubscriptionTier::PremiumPlusMonthly,
        SubscriptionTier::PremiumPlusYearly,
    ];

    let handles: Vec<_> = tiers
        .into_iter()
        .map(|tier| {
            let reconciler = reconciler.clone();
            thread::spawn(move || {
                let id = tier.product_id().unwrap();
                for _ in 0..10 {
                    reconciler
                        .reconcile(&[PurchaseRecord::new([id], Completed)], now())
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let record = reconciler.store().read();
    assert!(record.is_consistent());
    assert!(tiers.contains(&record.tier));
    assert_eq!(record, EntitlementRecord::granted(record.tier, now()));
}

#[test]
fn test_reconcile_returns_the_record_it_left() {
    let reconciler = Reconciler::new(test_store());

    let granted = reconciler
        .reconcile(&[PurchaseRecord::new([PREMIUM_YEARLY], Completed)], now())
        .unwrap();
    assert_eq!(
        granted.record,
        EntitlementRecord::granted(SubscriptionTier::PremiumYearly, now())
    );
    assert_eq!(granted.record, reconciler.store().read());

    let unchanged = reconciler
        .reconcile(&[PurchaseRecord::new([PREMIUM_MONTHLY], Pending)], now())
        .unwrap();
    assert_eq!(unchanged.outcome, Reconciliation::Unchanged);
    assert_eq!(unchanged.record, granted.record);

    let revoked = reconciler.reconcile(&[], now()).unwrap();
    assert_eq!(
        revoked,
        Reconciled {
            outcome: Reconciliation::Revoked,
            record: EntitlementRecord::free(),
        }
    );
}
