pub mod dev;
pub mod entitlement;
pub mod session;

use axum::{
    Router,
    routing::{get, post},
};

use crate::db::AppState;

/// Routes for feature screens and the purchase UI.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(entitlement::health))
        .route("/entitlement", get(entitlement::get_entitlement))
        .route("/usage/{feature}", get(entitlement::get_usage))
        .route("/usage/{feature}/consume", post(entitlement::consume_usage))
        .route("/session", get(session::get_session))
        .route("/session/start", post(session::start_session))
        .route("/session/stop", post(session::stop_session))
        .route("/catalog", get(session::list_catalog))
        .route("/catalog/query", post(session::query_catalog))
        .route("/purchases", post(session::launch_purchase))
}

/// Offline testing hooks, only mounted in dev mode.
pub fn dev_router() -> Router<AppState> {
    Router::new().route("/dev/simulate-purchase", post(dev::simulate_purchase))
}
