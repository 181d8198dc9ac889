use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProductKind {
    Subscription,
}

/// A purchasable offering as reported by the purchase provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub kind: ProductKind,
    /// Provider-formatted price (e.g. "$9.99"), passed through untouched
    pub price_display: String,
    /// Raw offer data, opaque to entitlement logic
    #[serde(default)]
    pub offer: serde_json::Value,
}

impl Product {
    pub fn subscription(id: impl Into<String>, price_display: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ProductKind::Subscription,
            price_display: price_display.into(),
            offer: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PurchaseStatus {
    Completed,
    Pending,
    Cancelled,
    Failed,
}

/// One purchase as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub product_ids: Vec<String>,
    pub status: PurchaseStatus,
    /// Provider purchase token, if the provider issues one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_token: Option<String>,
}

impl PurchaseRecord {
    pub fn new<I, S>(product_ids: I, status: PurchaseStatus) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            product_ids: product_ids.into_iter().map(Into::into).collect(),
            status,
            purchase_token: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == PurchaseStatus::Completed
    }
}
