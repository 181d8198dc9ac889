//! Purchase session: the state machine between the app and the purchase provider.
//!
//! ```text
//! Disconnected ──start──▶ Connecting ──Connected──▶ Ready ◀──▶ Querying
//!       ▲                     │                      │  ▲
//!       │                     ▼                      ▼  │
//!       └────stop──────── Error(msg)            Purchasing
//! ```
//!
//! Provider events for one connection are drained by a single task, so
//! reconciliations triggered by the existing-purchases query and by
//! unsolicited updates are applied one after another.

mod reconcile;

pub use reconcile::{Reconciled, Reconciler, Reconciliation, select_tier};

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::catalog::ProductCatalog;
use crate::db::EntitlementStore;
use crate::error::{AppError, Result};
use crate::models::{
    EntitlementRecord, Product, PurchaseRecord, SUBSCRIPTION_PRODUCT_IDS, SubscriptionTier,
};
use crate::provider::{EventReceiver, ProviderEvent, PurchaseProvider, PurchaseUpdate};

/// Message reported when the provider drops an established connection.
pub const SERVICE_DISCONNECTED: &str = "Billing service disconnected";

const NOTICE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Ready,
    Querying,
    Purchasing,
    Error(String),
}

impl SessionState {
    /// Ready or one of its sub-states.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            SessionState::Ready | SessionState::Querying | SessionState::Purchasing
        )
    }
}

/// Asynchronous outcomes published to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    ProductsAvailable(Vec<Product>),
    EntitlementChanged(EntitlementRecord),
    PurchaseCancelled,
    PurchaseFailed(String),
    CatalogUnavailable(String),
    PurchasesUnavailable(String),
    ConnectionFailed(String),
    Disconnected(String),
}

impl SessionNotice {
    /// The error this notice reports, if it reports one.
    pub fn as_error(&self) -> Option<AppError> {
        match self {
            SessionNotice::PurchaseCancelled => Some(AppError::PurchaseCancelled),
            SessionNotice::PurchaseFailed(msg) => Some(AppError::PurchaseFailed(msg.clone())),
            SessionNotice::CatalogUnavailable(msg) => {
                Some(AppError::CatalogUnavailable(msg.clone()))
            }
            SessionNotice::ConnectionFailed(msg) => Some(AppError::ConnectionFailed(msg.clone())),
            _ => None,
        }
    }
}

/// State shared between the session handle and its event loop.
struct Shared {
    provider: Arc<dyn PurchaseProvider>,
    reconciler: Reconciler,
    catalog: ProductCatalog,
    state: watch::Sender<SessionState>,
    notices: broadcast::Sender<SessionNotice>,
}

/// Coordinates one user's purchase lifecycle with the provider.
///
/// Created once at startup with the shared [`EntitlementStore`]; `start` and
/// `stop` may be called any number of times over its lifetime. `start` and
/// the query operations must be called from within a Tokio runtime.
pub struct PurchaseSession {
    shared: Arc<Shared>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl PurchaseSession {
    pub fn new(provider: Arc<dyn PurchaseProvider>, store: EntitlementStore) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                provider,
                reconciler: Reconciler::new(store),
                catalog: ProductCatalog::new(),
                state,
                notices,
            }),
            event_loop: Mutex::new(None),
        }
    }

    // ==================== Observation ====================

    pub fn state(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.shared.notices.subscribe()
    }

    pub fn store(&self) -> &EntitlementStore {
        self.shared.reconciler.store()
    }

    // ==================== Lifecycle ====================

    /// Open a connection to the provider.
    ///
    /// Valid from `Disconnected` or `Error`; a no-op while a connection is
    /// being made or is up. There is no automatic retry after a failure.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AppError::Internal(format!("No async runtime: {}", e)))?;

        let mut event_loop = self
            .event_loop
            .lock()
            .map_err(|_| AppError::Internal("session lock poisoned".into()))?;

        let current = self.state();
        if current == SessionState::Connecting || current.is_connected() {
            tracing::debug!("Session already {:?}, ignoring start", current);
            return Ok(());
        }

        if let Some(previous) = event_loop.take() {
            previous.abort();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.set_state(SessionState::Connecting);
        *event_loop = Some(runtime.spawn(run_event_loop(self.shared.clone(), rx)));

        tracing::info!(
            "Connecting to {} purchase provider",
            self.shared.provider.provider_name()
        );
        self.shared.provider.connect(tx);
        Ok(())
    }

    /// Release the provider connection and clear the catalog.
    ///
    /// Always permitted. The entitlement store is untouched.
    pub fn stop(&self) {
        // Held until Disconnected is published so a concurrent start waits
        let mut event_loop = self.event_loop.lock().ok();
        if let Some(handle) = event_loop.as_mut().and_then(|guard| guard.take()) {
            handle.abort();
        }

        self.shared.provider.disconnect();
        self.shared.catalog.clear();
        self.shared.set_state(SessionState::Disconnected);
        drop(event_loop);
        tracing::info!("Purchase session stopped");
    }

    // ==================== Catalog ====================

    /// Ask the provider for the subscription catalog.
    ///
    /// The answer arrives asynchronously as `ProductsAvailable` or
    /// `CatalogUnavailable`.
    pub fn query_catalog(&self) -> Result<()> {
        self.shared.query_catalog()
    }

    pub fn list_known_products(&self) -> Vec<Product> {
        self.shared.catalog.all()
    }

    // ==================== Purchasing ====================

    /// Hand the purchase flow for `product_id` to the provider.
    ///
    /// Fails with `ProductNotFound` if the product is not in the current
    /// catalog; in that case nothing is launched and the state is unchanged.
    /// Does not wait for the outcome.
    pub fn launch_purchase(&self, product_id: &str) -> Result<()> {
        let product = self
            .shared
            .catalog
            .get(product_id)
            .ok_or_else(|| AppError::ProductNotFound(product_id.to_string()))?;

        let mut rejection = None;
        self.shared.state.send_if_modified(|state| match state {
            SessionState::Ready | SessionState::Querying => {
                *state = SessionState::Purchasing;
                true
            }
            SessionState::Purchasing => {
                rejection = Some(AppError::PurchaseInProgress);
                false
            }
            _ => {
                rejection = Some(AppError::NotConnected);
                false
            }
        });
        if let Some(e) = rejection {
            return Err(e);
        }

        tracing::info!("Launching purchase flow for {}", product.id);
        self.shared.provider.launch_flow(&product);
        Ok(())
    }

    /// Grant `tier` without going through the provider (offline/testing hook).
    ///
    /// Uses the reconciliation tier mapping, so expiry follows the tier's
    /// billing period and the write is serialized with real reconciliations.
    pub fn simulate_purchase(&self, tier: SubscriptionTier) -> Result<EntitlementRecord> {
        let reconciled = self.shared.reconciler.simulate(tier, Utc::now())?;
        self.shared
            .notify(SessionNotice::EntitlementChanged(reconciled.record));
        Ok(reconciled.record)
    }

    /// Reconcile a purchase list directly, as the event loop would.
    pub fn reconcile(&self, purchases: &[PurchaseRecord]) -> Result<Reconciled> {
        self.shared.reconcile(purchases)
    }
}

impl Drop for PurchaseSession {
    fn drop(&mut self) {
        if let Ok(mut event_loop) = self.event_loop.lock()
            && let Some(handle) = event_loop.take()
        {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for PurchaseSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurchaseSession")
            .field("provider", &self.shared.provider.provider_name())
            .field("state", &self.state())
            .finish()
    }
}

async fn run_event_loop(shared: Arc<Shared>, mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        shared.handle_event(event);
    }
    tracing::debug!("Provider event channel closed");
}

impl Shared {
    fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next.clone());
        if previous != next {
            tracing::debug!("Session {:?} -> {:?}", previous, next);
        }
    }

    /// Move from `from` to `to`; any other current state is left alone.
    fn transition(&self, from: &SessionState, to: SessionState) {
        let moved = self.state.send_if_modified(|state| {
            if state == from {
                *state = to.clone();
                true
            } else {
                false
            }
        });
        if moved {
            tracing::debug!("Session {:?} -> {:?}", from, to);
        }
    }

    fn notify(&self, notice: SessionNotice) {
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }

    fn query_catalog(&self) -> Result<()> {
        if !self.state().is_connected() {
            return Err(AppError::NotConnected);
        }
        self.transition(&SessionState::Ready, SessionState::Querying);
        self.provider.query_products(&SUBSCRIPTION_PRODUCT_IDS);
        Ok(())
    }

    fn reconcile(&self, purchases: &[PurchaseRecord]) -> Result<Reconciled> {
        let reconciled = self.reconciler.reconcile(purchases, Utc::now())?;
        if reconciled.outcome != Reconciliation::Unchanged {
            self.notify(SessionNotice::EntitlementChanged(reconciled.record));
        }
        Ok(reconciled)
    }

    fn handle_event(&self, event: ProviderEvent) {
        let current = self.state();

        match event {
            ProviderEvent::Connected => {
                if current != SessionState::Connecting {
                    tracing::warn!("Ignoring handshake while {:?}", current);
                    return;
                }
                self.set_state(SessionState::Ready);
                tracing::info!("Purchase provider connected");

                if let Err(e) = self.query_catalog() {
                    tracing::warn!("Catalog query not issued: {}", e);
                }
                self.provider.query_existing_purchases();
            }
            ProviderEvent::ConnectionFailed(message) => {
                if current != SessionState::Connecting {
                    tracing::warn!("Ignoring handshake failure while {:?}", current);
                    return;
                }
                tracing::warn!("Purchase provider connection failed: {}", message);
                self.set_state(SessionState::Error(message.clone()));
                self.notify(SessionNotice::ConnectionFailed(message));
            }
            ProviderEvent::ServiceDisconnected => {
                if !current.is_connected() && current != SessionState::Connecting {
                    return;
                }
                tracing::warn!("{}", SERVICE_DISCONNECTED);
                self.catalog.clear();
                self.set_state(SessionState::Error(SERVICE_DISCONNECTED.to_string()));
                self.notify(SessionNotice::Disconnected(SERVICE_DISCONNECTED.to_string()));
            }
            // Query and purchase results only count once the handshake is done
            _ if !current.is_connected() => {
                tracing::warn!("Dropping provider result received while {:?}", current);
            }
            ProviderEvent::ProductsQueried(Ok(products)) => {
                tracing::info!("Catalog loaded with {} product(s)", products.len());
                self.catalog.set(products);
                self.transition(&SessionState::Querying, SessionState::Ready);
                self.notify(SessionNotice::ProductsAvailable(self.catalog.all()));
            }
            ProviderEvent::ProductsQueried(Err(message)) => {
                tracing::warn!("Catalog unavailable: {}", message);
                self.transition(&SessionState::Querying, SessionState::Ready);
                self.notify(SessionNotice::CatalogUnavailable(message));
            }
            ProviderEvent::ExistingPurchases(Ok(purchases)) => {
                if let Err(e) = self.reconcile(&purchases) {
                    tracing::error!("Reconciliation of existing purchases failed: {}", e);
                }
            }
            ProviderEvent::ExistingPurchases(Err(message)) => {
                tracing::warn!("Existing purchases unavailable: {}", message);
                self.notify(SessionNotice::PurchasesUnavailable(message));
            }
            ProviderEvent::PurchasesUpdated(update) => {
                match update {
                    PurchaseUpdate::Purchased(purchases) => {
                        if let Err(e) = self.reconcile(&purchases) {
                            tracing::error!("Reconciliation of purchase update failed: {}", e);
                        }
                    }
                    PurchaseUpdate::UserCancelled => {
                        tracing::info!("Purchase cancelled by user");
                        self.notify(SessionNotice::PurchaseCancelled);
                    }
                    PurchaseUpdate::Failed(message) => {
                        tracing::warn!("Purchase failed: {}", message);
                        self.notify(SessionNotice::PurchaseFailed(message));
                    }
                }
                self.transition(&SessionState::Purchasing, SessionState::Ready);
            }
        }
    }
}
