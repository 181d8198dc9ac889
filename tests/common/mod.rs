//! Test utilities and fixtures for ZenFit integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use chrono::{DateTime, Local, TimeZone};
use serde_json::Value;
use tokio::sync::broadcast;

pub use zenfit::db::{AppState, EntitlementStore, create_memory_pool, keys};
pub use zenfit::error::AppError;
pub use zenfit::handlers;
pub use zenfit::models::*;
pub use zenfit::policy::{Entitlements, Limit};
pub use zenfit::provider::{
    EventSender, FlowOutcome, ProviderEvent, PurchaseProvider, PurchaseUpdate, SandboxProvider,
    default_products,
};
pub use zenfit::session::{
    PurchaseSession, Reconciled, Reconciler, Reconciliation, SERVICE_DISCONNECTED, SessionNotice,
    SessionState,
};

const WAIT: Duration = Duration::from_secs(2);

/// Create an in-memory entitlement store with schema initialized
pub fn test_store() -> EntitlementStore {
    EntitlementStore::open_in_memory().expect("Failed to create in-memory store")
}

/// A local wall-clock instant, for driving day boundaries deterministically
pub fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .expect("Unambiguous local time")
}

/// Session wired to a scriptable sandbox provider
pub struct TestSession {
    pub provider: Arc<SandboxProvider>,
    pub session: Arc<PurchaseSession>,
    pub store: EntitlementStore,
}

impl TestSession {
    pub fn new() -> Self {
        Self::with_provider(SandboxProvider::new())
    }

    pub fn with_provider(provider: SandboxProvider) -> Self {
        let provider = Arc::new(provider);
        let store = test_store();
        let session = Arc::new(PurchaseSession::new(provider.clone(), store.clone()));
        Self {
            provider,
            session,
            store,
        }
    }

    pub fn entitlements(&self) -> Entitlements {
        Entitlements::new(self.store.clone())
    }

    /// Start the session and wait for the catalog to load.
    ///
    /// Returns a notice receiver subscribed before `start`, so nothing the
    /// connection produced is missed.
    pub async fn connect(&self) -> broadcast::Receiver<SessionNotice> {
        let mut notices = self.session.subscribe();
        self.session.start().expect("Failed to start session");
        wait_for_notice(&mut notices, |n| {
            matches!(n, SessionNotice::ProductsAvailable(_))
        })
        .await;
        notices
    }

    pub async fn wait_for_state(&self, expected: SessionState) {
        let mut rx = self.session.subscribe_state();
        tokio::time::timeout(WAIT, rx.wait_for(|s| *s == expected))
            .await
            .unwrap_or_else(|_| panic!("Timed out waiting for {:?}", expected))
            .expect("State channel closed");
    }
}

/// Receive notices until one matches `pred`
pub async fn wait_for_notice(
    notices: &mut broadcast::Receiver<SessionNotice>,
    pred: impl Fn(&SessionNotice) -> bool,
) -> SessionNotice {
    loop {
        let notice = tokio::time::timeout(WAIT, notices.recv())
            .await
            .expect("Timed out waiting for notice")
            .expect("Notice channel closed");
        if pred(&notice) {
            return notice;
        }
    }
}

/// Wait for the next entitlement change to `tier`
pub async fn wait_for_tier(
    notices: &mut broadcast::Receiver<SessionNotice>,
    tier: SubscriptionTier,
) -> EntitlementRecord {
    match wait_for_notice(notices, |n| {
        matches!(n, SessionNotice::EntitlementChanged(r) if r.tier == tier)
    })
    .await
    {
        SessionNotice::EntitlementChanged(record) => record,
        other => panic!("Unexpected notice {:?}", other),
    }
}

/// Let queued provider events drain through the event loop
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

// ============ HTTP ============

/// Full router (dev routes included) over a fresh sandbox session
pub fn test_app() -> (Router, TestSession) {
    let ts = TestSession::new();
    let state = AppState::new(ts.session.clone());
    let app = Router::new()
        .merge(handlers::router())
        .merge(handlers::dev_router())
        .with_state(state);
    (app, ts)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
