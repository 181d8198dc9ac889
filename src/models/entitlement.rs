use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::SubscriptionTier;

/// The currently granted subscription tier and its expiry.
///
/// `expires_at` (Unix seconds) is present iff the tier is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntitlementRecord {
    pub tier: SubscriptionTier,
    pub expires_at: Option<i64>,
}

impl EntitlementRecord {
    pub fn free() -> Self {
        Self {
            tier: SubscriptionTier::Free,
            expires_at: None,
        }
    }

    /// Record granting `tier` for one billing period starting at `now`.
    pub fn granted(tier: SubscriptionTier, now: DateTime<Utc>) -> Self {
        match tier.expiry_from(now) {
            Some(expiry) => Self {
                tier,
                expires_at: Some(expiry.timestamp()),
            },
            None => Self::free(),
        }
    }

    /// Paid tiers must carry an expiry and Free must not.
    pub fn is_consistent(&self) -> bool {
        self.tier.is_paid() == self.expires_at.is_some()
    }

    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(expires_at) if now >= expires_at)
    }

    /// The tier every reader must act on: Free once the expiry has passed.
    pub fn effective_tier(&self, now: i64) -> SubscriptionTier {
        if self.is_expired(now) {
            SubscriptionTier::Free
        } else {
            self.tier
        }
    }
}

/// A feature metered by a daily quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Feature {
    Workout,
    Meditation,
}

/// Per-day usage counters. Stale days read as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    pub workouts_today: u32,
    pub meditations_today: u32,
    pub day: NaiveDate,
}

impl Default for UsageCounters {
    fn default() -> Self {
        Self {
            workouts_today: 0,
            meditations_today: 0,
            day: DateTime::UNIX_EPOCH.date_naive(),
        }
    }
}

impl UsageCounters {
    /// Fresh counters for `day`.
    pub fn starting(day: NaiveDate) -> Self {
        Self {
            day,
            ..Self::default()
        }
    }

    /// Counters as seen on `today`, reset to zero if they belong to another day.
    pub fn as_of(self, today: NaiveDate) -> Self {
        if self.day == today {
            self
        } else {
            Self::starting(today)
        }
    }

    pub fn count(&self, feature: Feature) -> u32 {
        match feature {
            Feature::Workout => self.workouts_today,
            Feature::Meditation => self.meditations_today,
        }
    }

    pub fn increment(&mut self, feature: Feature) -> u32 {
        let slot = match feature {
            Feature::Workout => &mut self.workouts_today,
            Feature::Meditation => &mut self.meditations_today,
        };
        *slot = slot.saturating_add(1);
        *slot
    }
}
