//! Deriving the stored entitlement from provider-reported purchases.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::db::EntitlementStore;
use crate::error::{AppError, Result};
use crate::models::{EntitlementRecord, PurchaseRecord, PurchaseStatus, SubscriptionTier};

/// What a reconciliation did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// A completed subscription was found; this tier now holds
    Granted(SubscriptionTier),
    /// No completed subscription; the user is back on Free
    Revoked,
    /// Status-only report (nothing completed); store left alone
    Unchanged,
}

/// The outcome of one reconciliation and the entitlement it left stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub outcome: Reconciliation,
    /// Stored record as of the end of this reconciliation
    pub record: EntitlementRecord,
}

/// Decide the outcome for a list of purchases without touching the store.
///
/// A non-empty list with no completed purchase (only pending, cancelled or
/// failed records) carries no entitlement information and changes nothing.
/// Otherwise the completed purchases are matched against the subscription
/// product ids and the highest ranked tier wins; no match means Free.
pub fn select_tier(purchases: &[PurchaseRecord]) -> Reconciliation {
    if !purchases.is_empty() && !purchases.iter().any(PurchaseRecord::is_completed) {
        return Reconciliation::Unchanged;
    }

    purchases
        .iter()
        .filter(|p| p.is_completed())
        .flat_map(|p| p.product_ids.iter())
        .filter_map(|id| SubscriptionTier::from_product_id(id))
        .max_by_key(SubscriptionTier::rank)
        .map(Reconciliation::Granted)
        .unwrap_or(Reconciliation::Revoked)
}

/// The only writer of the stored tier.
///
/// Reconciliations never interleave: a second call waits for the first to
/// finish writing before it decides anything.
#[derive(Debug)]
pub struct Reconciler {
    store: EntitlementStore,
    lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(store: EntitlementStore) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &EntitlementStore {
        &self.store
    }

    /// Apply `purchases` to the store; expiries are counted from `now`.
    pub fn reconcile(
        &self,
        purchases: &[PurchaseRecord],
        now: DateTime<Utc>,
    ) -> Result<Reconciled> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AppError::Internal("reconciliation lock poisoned".into()))?;

        let outcome = select_tier(purchases);
        let record = match outcome {
            Reconciliation::Granted(tier) => {
                let record = EntitlementRecord::granted(tier, now);
                self.store.write(&record)?;
                tracing::info!(
                    "Entitlement granted: {} until {:?}",
                    tier,
                    record.expires_at
                );
                record
            }
            Reconciliation::Revoked => {
                let record = EntitlementRecord::free();
                self.store.write(&record)?;
                tracing::info!("No active subscription, entitlement set to free");
                record
            }
            Reconciliation::Unchanged => {
                tracing::debug!(
                    "Ignoring {} purchase(s) without a completed status",
                    purchases.len()
                );
                self.store.read()
            }
        };

        Ok(Reconciled { outcome, record })
    }

    /// Grant `tier` as if the provider had reported a completed purchase of it.
    ///
    /// Goes through the same tier mapping and expiry rules as a real purchase.
    /// Simulating Free clears the entitlement.
    pub fn simulate(&self, tier: SubscriptionTier, now: DateTime<Utc>) -> Result<Reconciled> {
        let purchases: Vec<PurchaseRecord> = tier
            .product_id()
            .map(|id| PurchaseRecord::new([id], PurchaseStatus::Completed))
            .into_iter()
            .collect();
        self.reconcile(&purchases, now)
    }
}
