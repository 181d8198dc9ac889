//! Outbound interface to the purchase provider.
//!
//! The provider performs the real commerce transaction. Every operation here
//! is fire-and-forget: results, and unsolicited purchase updates, come back
//! as [`ProviderEvent`]s on the channel handed to [`PurchaseProvider::connect`],
//! which the purchase session drains from a single task.

mod sandbox;

pub use sandbox::{FlowOutcome, SandboxProvider, default_products};

use tokio::sync::mpsc;

use crate::models::{Product, PurchaseRecord};

/// Inbound events from the purchase provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// Handshake succeeded
    Connected,
    /// Handshake failed; message is surfaced verbatim
    ConnectionFailed(String),
    /// The provider dropped an established connection
    ServiceDisconnected,
    /// Result of `query_products`
    ProductsQueried(Result<Vec<Product>, String>),
    /// Result of `query_existing_purchases`
    ExistingPurchases(Result<Vec<PurchaseRecord>, String>),
    /// Outcome of a purchase flow, or an unsolicited update
    PurchasesUpdated(PurchaseUpdate),
}

/// What the provider reported for a purchase flow.
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseUpdate {
    Purchased(Vec<PurchaseRecord>),
    UserCancelled,
    Failed(String),
}

pub type EventSender = mpsc::UnboundedSender<ProviderEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ProviderEvent>;

/// Trait implemented by purchase provider bindings.
pub trait PurchaseProvider: Send + Sync {
    /// Provider name for logging (e.g., "sandbox", "play")
    fn provider_name(&self) -> &'static str;

    /// Open a connection. The provider reports `Connected` or
    /// `ConnectionFailed` on `events` and keeps using it until `disconnect`.
    fn connect(&self, events: EventSender);

    /// Release the connection and stop emitting events.
    fn disconnect(&self);

    /// Ask for product details; answered with `ProductsQueried`.
    fn query_products(&self, product_ids: &[&str]);

    /// Ask for purchases the user already owns; answered with `ExistingPurchases`.
    fn query_existing_purchases(&self);

    /// Hand the purchase flow for `product` to the provider.
    /// The outcome arrives later as `PurchasesUpdated`.
    fn launch_flow(&self, product: &Product);
}
