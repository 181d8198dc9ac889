use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;
use crate::models::Product;
use crate::session::SessionState;

pub async fn get_session(State(state): State<AppState>) -> Json<SessionState> {
    Json(state.session.state())
}

pub async fn start_session(State(state): State<AppState>) -> Result<Json<SessionState>> {
    state.session.start()?;
    Ok(Json(state.session.state()))
}

pub async fn stop_session(State(state): State<AppState>) -> Json<SessionState> {
    state.session.stop();
    Json(state.session.state())
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub products: Vec<Product>,
}

pub async fn list_catalog(State(state): State<AppState>) -> Json<CatalogResponse> {
    Json(CatalogResponse {
        products: state.session.list_known_products(),
    })
}

/// Results arrive asynchronously; poll `GET /catalog`.
pub async fn query_catalog(State(state): State<AppState>) -> Result<Json<SessionState>> {
    state.session.query_catalog()?;
    Ok(Json(state.session.state()))
}

#[derive(Debug, Deserialize)]
pub struct LaunchPurchaseRequest {
    pub product_id: String,
}

/// Starts the provider's purchase flow; the outcome is reconciled later.
pub async fn launch_purchase(
    State(state): State<AppState>,
    Json(request): Json<LaunchPurchaseRequest>,
) -> Result<Json<SessionState>> {
    state.session.launch_purchase(&request.product_id)?;
    Ok(Json(state.session.state()))
}
