use std::sync::Mutex;

use crate::models::{
    PREMIUM_MONTHLY, PREMIUM_PLUS_MONTHLY, PREMIUM_PLUS_YEARLY, PREMIUM_YEARLY, Product,
    PurchaseRecord, PurchaseStatus,
};

use super::{EventSender, ProviderEvent, PurchaseProvider, PurchaseUpdate};

/// How the sandbox answers the next purchase flow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FlowOutcome {
    #[default]
    Complete,
    Cancel,
    Fail(String),
}

/// In-process purchase provider for dev mode and tests.
///
/// Serves the four subscription products, remembers completed purchases and
/// can be scripted to fail the handshake, either query, or the next flow.
#[derive(Debug)]
pub struct SandboxProvider {
    inner: Mutex<SandboxState>,
}

#[derive(Debug, Default)]
struct SandboxState {
    events: Option<EventSender>,
    products: Vec<Product>,
    owned: Vec<PurchaseRecord>,
    connect_error: Option<String>,
    catalog_error: Option<String>,
    purchases_error: Option<String>,
    next_outcome: FlowOutcome,
    connect_count: usize,
}

impl SandboxProvider {
    pub fn new() -> Self {
        Self::with_products(default_products())
    }

    pub fn with_products(products: Vec<Product>) -> Self {
        Self {
            inner: Mutex::new(SandboxState {
                products,
                ..SandboxState::default()
            }),
        }
    }

    /// Fail every handshake with `message` until cleared with `None`.
    pub fn set_connect_error(&self, message: Option<&str>) {
        self.with_state(|s| s.connect_error = message.map(String::from));
    }

    /// Fail every catalog query with `message` until cleared with `None`.
    pub fn set_catalog_error(&self, message: Option<&str>) {
        self.with_state(|s| s.catalog_error = message.map(String::from));
    }

    /// Fail every existing-purchases query with `message` until cleared with `None`.
    pub fn set_purchases_error(&self, message: Option<&str>) {
        self.with_state(|s| s.purchases_error = message.map(String::from));
    }

    /// Script the outcome of the next purchase flow.
    pub fn set_next_outcome(&self, outcome: FlowOutcome) {
        self.with_state(|s| s.next_outcome = outcome);
    }

    /// Seed a purchase the user already owns.
    pub fn grant(&self, record: PurchaseRecord) {
        self.with_state(|s| s.owned.push(record));
    }

    /// Emit an unsolicited purchase update on the live connection.
    pub fn push_update(&self, update: PurchaseUpdate) {
        self.with_state(|s| s.emit(ProviderEvent::PurchasesUpdated(update)));
    }

    /// Simulate the provider dropping the connection.
    pub fn drop_connection(&self) {
        self.with_state(|s| {
            s.emit(ProviderEvent::ServiceDisconnected);
            s.events = None;
        });
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .lock()
            .map(|s| s.events.is_some())
            .unwrap_or(false)
    }

    /// Number of handshakes attempted so far.
    pub fn connect_count(&self) -> usize {
        self.inner.lock().map(|s| s.connect_count).unwrap_or(0)
    }

    pub fn owned_purchases(&self) -> Vec<PurchaseRecord> {
        self.inner
            .lock()
            .map(|s| s.owned.clone())
            .unwrap_or_default()
    }

    fn with_state(&self, f: impl FnOnce(&mut SandboxState)) {
        if let Ok(mut state) = self.inner.lock() {
            f(&mut state);
        }
    }
}

impl Default for SandboxProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxState {
    fn emit(&self, event: ProviderEvent) {
        match &self.events {
            Some(events) => {
                if events.send(event).is_err() {
                    tracing::debug!("Sandbox event dropped: session gone");
                }
            }
            None => tracing::debug!("Sandbox not connected, dropping {:?}", event),
        }
    }
}

impl PurchaseProvider for SandboxProvider {
    fn provider_name(&self) -> &'static str {
        "sandbox"
    }

    fn connect(&self, events: EventSender) {
        self.with_state(|s| {
            s.connect_count += 1;
            match s.connect_error.clone() {
                Some(message) => {
                    let _ = events.send(ProviderEvent::ConnectionFailed(message));
                    s.events = None;
                }
                None => {
                    let _ = events.send(ProviderEvent::Connected);
                    s.events = Some(events);
                }
            }
        });
    }

    fn disconnect(&self) {
        self.with_state(|s| s.events = None);
    }

    fn query_products(&self, product_ids: &[&str]) {
        self.with_state(|s| {
            let result = match &s.catalog_error {
                Some(message) => Err(message.clone()),
                None => Ok(s
                    .products
                    .iter()
                    .filter(|p| product_ids.contains(&p.id.as_str()))
                    .cloned()
                    .collect()),
            };
            s.emit(ProviderEvent::ProductsQueried(result));
        });
    }

    fn query_existing_purchases(&self) {
        self.with_state(|s| {
            let result = match &s.purchases_error {
                Some(message) => Err(message.clone()),
                None => Ok(s.owned.clone()),
            };
            s.emit(ProviderEvent::ExistingPurchases(result));
        });
    }

    fn launch_flow(&self, product: &Product) {
        self.with_state(|s| {
            let update = match std::mem::take(&mut s.next_outcome) {
                FlowOutcome::Complete => {
                    let mut record = PurchaseRecord::new([product.id.clone()], PurchaseStatus::Completed);
                    record.purchase_token = Some(uuid::Uuid::new_v4().to_string());
                    s.owned.push(record);
                    // Report everything owned, like a fresh purchases query
                    PurchaseUpdate::Purchased(s.owned.clone())
                }
                FlowOutcome::Cancel => PurchaseUpdate::UserCancelled,
                FlowOutcome::Fail(message) => PurchaseUpdate::Failed(message),
            };
            s.emit(ProviderEvent::PurchasesUpdated(update));
        });
    }
}

/// The four subscription offerings with their list prices.
pub fn default_products() -> Vec<Product> {
    vec![
        Product::subscription(PREMIUM_MONTHLY, "$9.99"),
        Product::subscription(PREMIUM_YEARLY, "$59.99"),
        Product::subscription(PREMIUM_PLUS_MONTHLY, "$19.99"),
        Product::subscription(PREMIUM_PLUS_YEARLY, "$119.99"),
    ]
}
