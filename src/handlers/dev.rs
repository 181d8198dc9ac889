use axum::extract::State;
use serde::Deserialize;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;
use crate::models::{EntitlementRecord, SubscriptionTier};

#[derive(Debug, Deserialize)]
pub struct SimulatePurchaseRequest {
    pub tier: SubscriptionTier,
}

/// Grant a tier without the provider. Same expiry rules as a real purchase.
pub async fn simulate_purchase(
    State(state): State<AppState>,
    Json(request): Json<SimulatePurchaseRequest>,
) -> Result<Json<EntitlementRecord>> {
    let record = state.session.simulate_purchase(request.tier)?;
    tracing::info!("Simulated purchase of {}", request.tier);
    Ok(Json(record))
}
