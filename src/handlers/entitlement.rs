use axum::extract::State;
use chrono::Utc;
use serde::Serialize;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Path};
use crate::models::{Feature, FeatureAccessLevel, SubscriptionTier};
use crate::policy::{self, UsageReport};

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
pub struct EntitlementResponse {
    /// Tier as stored, before the expiry check
    pub tier: SubscriptionTier,
    /// Tier to gate on (Free once expired)
    pub effective_tier: SubscriptionTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub access_level: FeatureAccessLevel,
    pub advanced_insights: bool,
    pub ai_coach: bool,
}

pub async fn get_entitlement(State(state): State<AppState>) -> Json<EntitlementResponse> {
    // One read so every field describes the same record
    let record = state.entitlements.store().read();
    let effective_tier = record.effective_tier(Utc::now().timestamp());
    let level = policy::access_level(effective_tier);

    Json(EntitlementResponse {
        tier: record.tier,
        effective_tier,
        expires_at: record.expires_at,
        access_level: level,
        advanced_insights: policy::has_advanced_insights(level),
        ai_coach: policy::has_ai_coach_access(level),
    })
}

pub async fn get_usage(
    State(state): State<AppState>,
    Path(feature): Path<Feature>,
) -> Json<UsageReport> {
    Json(state.entitlements.usage_report(feature))
}

/// Record one completed use. Call only after the gated action succeeded.
pub async fn consume_usage(
    State(state): State<AppState>,
    Path(feature): Path<Feature>,
) -> Result<Json<UsageReport>> {
    state.entitlements.consume(feature)?;
    Ok(Json(state.entitlements.usage_report(feature)))
}
