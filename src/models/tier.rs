use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Provider product ids for the four subscription offerings.
pub const PREMIUM_MONTHLY: &str = "zenfit_premium_monthly";
pub const PREMIUM_YEARLY: &str = "zenfit_premium_yearly";
pub const PREMIUM_PLUS_MONTHLY: &str = "zenfit_premium_plus_monthly";
pub const PREMIUM_PLUS_YEARLY: &str = "zenfit_premium_plus_yearly";

/// Every product id that grants a subscription tier.
pub const SUBSCRIPTION_PRODUCT_IDS: [&str; 4] = [
    PREMIUM_MONTHLY,
    PREMIUM_YEARLY,
    PREMIUM_PLUS_MONTHLY,
    PREMIUM_PLUS_YEARLY,
];

/// Store dashboards sometimes report ids without the app prefix.
const PRODUCT_ID_PREFIX: &str = "zenfit_";

/// Subscription tier held by the user.
///
/// The snake_case string form is the persisted representation (format 1).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionTier {
    #[default]
    Free,
    PremiumMonthly,
    PremiumYearly,
    PremiumPlusMonthly,
    PremiumPlusYearly,
}

impl SubscriptionTier {
    pub const ALL: [SubscriptionTier; 5] = [
        SubscriptionTier::Free,
        SubscriptionTier::PremiumMonthly,
        SubscriptionTier::PremiumYearly,
        SubscriptionTier::PremiumPlusMonthly,
        SubscriptionTier::PremiumPlusYearly,
    ];

    pub fn is_paid(&self) -> bool {
        !matches!(self, SubscriptionTier::Free)
    }

    /// Precedence used when several subscriptions are active at once.
    ///
    /// PremiumPlus outranks Premium; within a level the yearly plan wins.
    pub fn rank(&self) -> u8 {
        match self {
            SubscriptionTier::Free => 0,
            SubscriptionTier::PremiumMonthly => 1,
            SubscriptionTier::PremiumYearly => 2,
            SubscriptionTier::PremiumPlusMonthly => 3,
            SubscriptionTier::PremiumPlusYearly => 4,
        }
    }

    pub fn billing_period(&self) -> Option<BillingPeriod> {
        match self {
            SubscriptionTier::Free => None,
            SubscriptionTier::PremiumMonthly | SubscriptionTier::PremiumPlusMonthly => {
                Some(BillingPeriod::Monthly)
            }
            SubscriptionTier::PremiumYearly | SubscriptionTier::PremiumPlusYearly => {
                Some(BillingPeriod::Yearly)
            }
        }
    }

    /// Provider product id that grants this tier (None for Free).
    pub fn product_id(&self) -> Option<&'static str> {
        match self {
            SubscriptionTier::Free => None,
            SubscriptionTier::PremiumMonthly => Some(PREMIUM_MONTHLY),
            SubscriptionTier::PremiumYearly => Some(PREMIUM_YEARLY),
            SubscriptionTier::PremiumPlusMonthly => Some(PREMIUM_PLUS_MONTHLY),
            SubscriptionTier::PremiumPlusYearly => Some(PREMIUM_PLUS_YEARLY),
        }
    }

    /// Map a provider product id to the tier it grants.
    ///
    /// Accepts both `zenfit_premium_monthly` and the bare `premium_monthly`.
    /// Anything else, including ids that spell out "free", grants nothing.
    pub fn from_product_id(product_id: &str) -> Option<Self> {
        let bare = product_id
            .strip_prefix(PRODUCT_ID_PREFIX)
            .unwrap_or(product_id);
        match bare.parse::<SubscriptionTier>() {
            Ok(SubscriptionTier::Free) | Err(_) => None,
            Ok(tier) => Some(tier),
        }
    }

    /// When an entitlement granted at `start` runs out (None for Free).
    pub fn expiry_from(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.billing_period().map(|period| period.end_from(start))
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Billing cadence of a paid tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Monthly,
    Yearly,
}

impl BillingPeriod {
    pub fn months(&self) -> u32 {
        match self {
            BillingPeriod::Monthly => 1,
            BillingPeriod::Yearly => 12,
        }
    }

    /// End of one billing period starting at `start`, in calendar months.
    pub fn end_from(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start
            .checked_add_months(Months::new(self.months()))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Coarse capability level derived from a tier. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeatureAccessLevel {
    Basic,
    Premium,
    PremiumPlus,
}
