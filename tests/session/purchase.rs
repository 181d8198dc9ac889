//! Tests for purchase flows and their effect on the stored entitlement.

use std::thread;

use chrono::{Months, Utc};

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[tokio::test]
async fn test_unknown_product_is_rejected_without_transition() {
    let ts = TestSession::new();
    let _notices = ts.connect().await;
    let before = ts.store.read();

    let result = ts.session.launch_purchase("zenfit_lifetime_unlock");

    assert!(matches!(result, Err(AppError::ProductNotFound(id)) if id == "zenfit_lifetime_unlock"));
    assert_eq!(ts.session.state(), SessionState::Ready);
    assert!(ts.provider.owned_purchases().is_empty());
    assert_eq!(ts.store.read(), before);
}

#[tokio::test]
async fn test_launch_before_connecting_is_rejected() {
    let ts = TestSession::new();

    assert!(matches!(
        ts.session.launch_purchase(PREMIUM_MONTHLY),
        Err(AppError::ProductNotFound(_))
    ));
    assert_eq!(ts.session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_completed_purchase_grants_tier() {
    let ts = TestSession::new();
    let mut notices = ts.connect().await;
    let started = Utc::now();

    ts.session.launch_purchase(PREMIUM_MONTHLY).unwrap();
    assert_eq!(ts.session.state(), SessionState::Purchasing);

    let record = wait_for_tier(&mut notices, SubscriptionTier::PremiumMonthly).await;
    ts.wait_for_state(SessionState::Ready).await;

    let expires_at = record.expires_at.unwrap();
    assert!(expires_at >= (started + Months::new(1)).timestamp());
    assert!(expires_at <= (Utc::now() + Months::new(1)).timestamp());
    assert_eq!(ts.store.read(), record);
    assert_eq!(
        ts.entitlements().current_access_level(),
        FeatureAccessLevel::Premium
    );
}

#[tokio::test]
async fn test_upgrade_takes_the_higher_tier() {
    let ts = TestSession::new();
    let mut notices = ts.connect().await;

    ts.session.launch_purchase(PREMIUM_MONTHLY).unwrap();
    wait_for_tier(&mut notices, SubscriptionTier::PremiumMonthly).await;
    ts.wait_for_state(SessionState::Ready).await;

    ts.session.launch_purchase(PREMIUM_PLUS_YEARLY).unwrap();
    wait_for_tier(&mut notices, SubscriptionTier::PremiumPlusYearly).await;

    assert_eq!(ts.provider.owned_purchases().len(), 2);
    assert_eq!(ts.store.read().tier, SubscriptionTier::PremiumPlusYearly);
    assert!(ts.entitlements().has_advanced_insights());
}

#[tokio::test]
async fn test_second_launch_while_purchasing_is_rejected() {
    let ts = TestSession::new();
    let mut notices = ts.connect().await;

    ts.session.launch_purchase(PREMIUM_YEARLY).unwrap();
    let second = ts.session.launch_purchase(PREMIUM_PLUS_MONTHLY);

    assert!(matches!(second, Err(AppError::PurchaseInProgress)));
    wait_for_tier(&mut notices, SubscriptionTier::PremiumYearly).await;
    assert_eq!(ts.provider.owned_purchases().len(), 1);
}

#[tokio::test]
async fn test_cancelled_purchase_keeps_entitlement() {
    let ts = TestSession::new();
    let mut notices = ts.connect().await;
    let granted = ts
        .session
        .simulate_purchase(SubscriptionTier::PremiumYearly)
        .unwrap();
    ts.provider.set_next_outcome(FlowOutcome::Cancel);

    ts.session.launch_purchase(PREMIUM_PLUS_MONTHLY).unwrap();

    let notice = wait_for_notice(&mut notices, |n| {
        matches!(n, SessionNotice::PurchaseCancelled)
    })
    .await;
    assert!(matches!(notice.as_error(), Some(AppError::PurchaseCancelled)));
    ts.wait_for_state(SessionState::Ready).await;
    assert_eq!(ts.store.read(), granted);
}

#[tokio::test]
async fn test_failed_purchase_reports_message_and_keeps_entitlement() {
    let ts = TestSession::new();
    let mut notices = ts.connect().await;
    let before = ts.store.read();
    ts.provider
        .set_next_outcome(FlowOutcome::Fail("Card declined".to_string()));

    ts.session.launch_purchase(PREMIUM_MONTHLY).unwrap();

    let notice = wait_for_notice(&mut notices, |n| {
        matches!(n, SessionNotice::PurchaseFailed(_))
    })
    .await;
    assert_eq!(notice, SessionNotice::PurchaseFailed("Card declined".to_string()));
    ts.wait_for_state(SessionState::Ready).await;
    assert_eq!(ts.store.read(), before);

    // The next flow goes through normally
    ts.session.launch_purchase(PREMIUM_MONTHLY).unwrap();
    wait_for_tier(&mut notices, SubscriptionTier::PremiumMonthly).await;
}

#[tokio::test]
async fn test_unsolicited_updates_are_reconciled() {
    let ts = TestSession::new();
    let mut notices = ts.connect().await;

    // e.g. a renewal or a purchase made on another device
    ts.provider.push_update(PurchaseUpdate::Purchased(vec![PurchaseRecord::new(
        [PREMIUM_PLUS_MONTHLY],
        PurchaseStatus::Completed,
    )]));
    wait_for_tier(&mut notices, SubscriptionTier::PremiumPlusMonthly).await;
    assert_eq!(ts.session.state(), SessionState::Ready);

    // Subscription lapsed: provider reports nothing owned
    ts.provider.push_update(PurchaseUpdate::Purchased(Vec::new()));
    wait_for_tier(&mut notices, SubscriptionTier::Free).await;
    assert_eq!(ts.store.read(), EntitlementRecord::free());
}

#[tokio::test]
async fn test_simulate_purchase_works_without_a_connection() {
    let ts = TestSession::new();
    let mut notices = ts.session.subscribe();

    let record = ts
        .session
        .simulate_purchase(SubscriptionTier::PremiumPlusYearly)
        .unwrap();

    assert_eq!(record.tier, SubscriptionTier::PremiumPlusYearly);
    assert!(record.expires_at.unwrap() > (Utc::now() + Months::new(11)).timestamp());
    assert_eq!(
        wait_for_tier(&mut notices, SubscriptionTier::PremiumPlusYearly).await,
        record
    );
    assert_eq!(ts.session.state(), SessionState::Disconnected);
    assert_eq!(ts.provider.connect_count(), 0);

    let cleared = ts.session.simulate_purchase(SubscriptionTier::Free).unwrap();
    assert_eq!(cleared, EntitlementRecord::free());
}

#[tokio::test]
async fn test_direct_reconcile_ignores_status_only_reports() {
    let ts = TestSession::new();
    ts.session
        .simulate_purchase(SubscriptionTier::PremiumMonthly)
        .unwrap();
    let before = ts.store.read();

    let outcome = ts
        .session
        .reconcile(&[
            PurchaseRecord::new([PREMIUM_PLUS_YEARLY], PurchaseStatus::Failed),
            PurchaseRecord::new([PREMIUM_YEARLY], PurchaseStatus::Cancelled),
        ])
        .unwrap()
        .outcome;

    assert_eq!(outcome, Reconciliation::Unchanged);
    assert_eq!(ts.store.read(), before);
}

#[test]
fn test_concurrent_simulations_each_return_their_own_grant() {
    let ts = TestSession::new();
    let tiers = [
        SubscriptionTier::PremiumMonthly,
        SubscriptionTier::PremiumYearly,
        SubscriptionTier::PremiumPlusMonthly,
        SubscriptionTier::PremiumPlusYearly,
    ];

    let handles: Vec<_> = tiers
        .into_iter()
        .map(|tier| {
            let session = ts.session.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    let record = session.simulate_purchase(tier).unwrap();
                    assert_eq!(record.tier, tier);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stored = ts.store.read();
    assert!(stored.is_consistent());
    assert!(tiers.contains(&stored.tier));
}
