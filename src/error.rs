use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Purchase cancelled")]
    PurchaseCancelled,

    #[error("Purchase failed: {0}")]
    PurchaseFailed(String),

    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Purchase session is not connected")]
    NotConnected,

    #[error("A purchase is already in progress")]
    PurchaseInProgress,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::ConnectionFailed(msg) => {
                (StatusCode::BAD_GATEWAY, "Connection failed", Some(msg.clone()))
            }
            AppError::ProductNotFound(id) => {
                (StatusCode::NOT_FOUND, "Product not found", Some(id.clone()))
            }
            AppError::PurchaseCancelled => (StatusCode::CONFLICT, "Purchase cancelled", None),
            AppError::PurchaseFailed(msg) => {
                (StatusCode::BAD_GATEWAY, "Purchase failed", Some(msg.clone()))
            }
            AppError::CatalogUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Catalog unavailable",
                Some(msg.clone()),
            ),
            AppError::NotConnected => (StatusCode::CONFLICT, "Session not connected", None),
            AppError::PurchaseInProgress => {
                (StatusCode::CONFLICT, "Purchase already in progress", None)
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone())),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
