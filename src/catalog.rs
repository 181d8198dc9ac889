//! In-memory snapshot of the provider's purchasable products.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::Product;

/// Product catalog for the current purchase session.
///
/// Rebuilt on every successful catalog query and emptied when the session
/// disconnects. Nothing here is persisted.
#[derive(Debug, Default)]
pub struct ProductCatalog {
    inner: RwLock<Snapshot>,
}

#[derive(Debug, Default)]
struct Snapshot {
    // Provider order, for listing
    products: Vec<Product>,
    index: HashMap<String, usize>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the catalog with a fresh snapshot.
    ///
    /// A later duplicate id replaces the earlier entry.
    pub fn set(&self, products: Vec<Product>) {
        let mut snapshot = Snapshot {
            products: Vec::with_capacity(products.len()),
            index: HashMap::with_capacity(products.len()),
        };
        for product in products {
            match snapshot.index.get(&product.id) {
                Some(&i) => snapshot.products[i] = product,
                None => {
                    snapshot
                        .index
                        .insert(product.id.clone(), snapshot.products.len());
                    snapshot.products.push(product);
                }
            }
        }

        if let Ok(mut inner) = self.inner.write() {
            *inner = snapshot;
        }
    }

    pub fn get(&self, id: &str) -> Option<Product> {
        let inner = self.inner.read().ok()?;
        let i = *inner.index.get(id)?;
        inner.products.get(i).cloned()
    }

    pub fn all(&self) -> Vec<Product> {
        self.inner
            .read()
            .map(|inner| inner.products.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.set(Vec::new());
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .read()
            .map(|inner| inner.products.is_empty())
            .unwrap_or(true)
    }
}
