//! Entitlement policy: tier → access level → daily quotas.
//!
//! The free functions are pure. [`Entitlements`] applies them to the stored
//! entitlement and usage counters and is what feature screens call on every
//! access attempt. It never touches the purchase session, so gating keeps
//! working while the session is disconnected or in error.

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::db::EntitlementStore;
use crate::error::Result;
use crate::models::{Feature, FeatureAccessLevel, SubscriptionTier};

/// A daily quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Limited(u32),
    Unbounded,
}

impl Limit {
    /// Whether one more use is allowed after `used` uses today.
    pub fn allows(&self, used: u32) -> bool {
        match self {
            Limit::Limited(max) => used < *max,
            Limit::Unbounded => true,
        }
    }

    /// The numeric cap, or None when unbounded.
    pub fn cap(&self) -> Option<u32> {
        match self {
            Limit::Limited(max) => Some(*max),
            Limit::Unbounded => None,
        }
    }
}

pub fn access_level(tier: SubscriptionTier) -> FeatureAccessLevel {
    match tier {
        SubscriptionTier::Free => FeatureAccessLevel::Basic,
        SubscriptionTier::PremiumMonthly | SubscriptionTier::PremiumYearly => {
            FeatureAccessLevel::Premium
        }
        SubscriptionTier::PremiumPlusMonthly | SubscriptionTier::PremiumPlusYearly => {
            FeatureAccessLevel::PremiumPlus
        }
    }
}

pub fn daily_limit(level: FeatureAccessLevel, feature: Feature) -> Limit {
    match (level, feature) {
        (FeatureAccessLevel::Basic, Feature::Workout) => Limit::Limited(2),
        (FeatureAccessLevel::Basic, Feature::Meditation) => Limit::Limited(1),
        (FeatureAccessLevel::Premium, Feature::Workout) => Limit::Limited(10),
        (FeatureAccessLevel::Premium, Feature::Meditation) => Limit::Limited(5),
        (FeatureAccessLevel::PremiumPlus, _) => Limit::Unbounded,
    }
}

pub fn has_advanced_insights(level: FeatureAccessLevel) -> bool {
    level == FeatureAccessLevel::PremiumPlus
}

pub fn has_ai_coach_access(level: FeatureAccessLevel) -> bool {
    level != FeatureAccessLevel::Basic
}

/// Today's standing for one metered feature.
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub feature: Feature,
    pub access_level: FeatureAccessLevel,
    pub used: u32,
    /// None = unlimited
    pub limit: Option<u32>,
    pub allowed: bool,
}

/// Feature gate over the entitlement store.
///
/// Callers check [`can_consume`](Self::can_consume) before the gated action
/// and call [`consume`](Self::consume) only once it has succeeded.
#[derive(Debug, Clone)]
pub struct Entitlements {
    store: EntitlementStore,
}

impl Entitlements {
    pub fn new(store: EntitlementStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &EntitlementStore {
        &self.store
    }

    pub fn current_tier(&self) -> SubscriptionTier {
        self.current_tier_at(Local::now())
    }

    pub fn current_tier_at(&self, now: DateTime<Local>) -> SubscriptionTier {
        self.store.effective_tier(now.timestamp())
    }

    pub fn current_access_level(&self) -> FeatureAccessLevel {
        self.current_access_level_at(Local::now())
    }

    pub fn current_access_level_at(&self, now: DateTime<Local>) -> FeatureAccessLevel {
        access_level(self.current_tier_at(now))
    }

    pub fn daily_limit(&self, feature: Feature) -> Limit {
        daily_limit(self.current_access_level(), feature)
    }

    pub fn has_advanced_insights(&self) -> bool {
        has_advanced_insights(self.current_access_level())
    }

    pub fn has_ai_coach_access(&self) -> bool {
        has_ai_coach_access(self.current_access_level())
    }

    pub fn can_consume(&self, feature: Feature) -> bool {
        self.can_consume_at(feature, Local::now())
    }

    pub fn can_consume_at(&self, feature: Feature, now: DateTime<Local>) -> bool {
        self.usage_report_at(feature, now).allowed
    }

    /// Record one completed use of `feature` today; returns the new count.
    pub fn consume(&self, feature: Feature) -> Result<u32> {
        self.consume_at(feature, Local::now())
    }

    pub fn consume_at(&self, feature: Feature, now: DateTime<Local>) -> Result<u32> {
        let count = self.store.increment_usage(feature, now.date_naive())?;
        tracing::debug!("Consumed {} ({} today)", feature.as_ref(), count);
        Ok(count)
    }

    pub fn usage_report(&self, feature: Feature) -> UsageReport {
        self.usage_report_at(feature, Local::now())
    }

    pub fn usage_report_at(&self, feature: Feature, now: DateTime<Local>) -> UsageReport {
        let level = self.current_access_level_at(now);
        let limit = daily_limit(level, feature);
        let used = self.store.usage(now.date_naive()).count(feature);

        UsageReport {
            feature,
            access_level: level,
            used,
            limit: limit.cap(),
            allowed: limit.allows(used),
        }
    }

    /// Zero today's counters for every feature.
    pub fn reset_daily_limits(&self) -> Result<()> {
        self.store.reset_usage(Local::now().date_naive())
    }
}
