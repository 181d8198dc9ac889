mod schema;
mod store;

pub use schema::init_db;
pub use store::{EntitlementStore, FORMAT_VERSION, keys};

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::policy::Entitlements;
use crate::session::PurchaseSession;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Feature gate over the entitlement store
    pub entitlements: Entitlements,
    /// The purchase session driving the provider connection
    pub session: Arc<PurchaseSession>,
}

impl AppState {
    /// The gate reads the same store the session writes.
    pub fn new(session: Arc<PurchaseSession>) -> Self {
        Self {
            entitlements: Entitlements::new(session.store().clone()),
            session,
        }
    }
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| init_db(conn));
    Pool::builder().max_size(10).build(manager)
}

/// Pool over a private in-memory database.
///
/// Each in-memory connection is its own database, so the pool holds exactly
/// one connection and never recycles it.
pub fn create_memory_pool() -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::memory().with_init(|conn| init_db(conn));
    Pool::builder()
        .max_size(1)
        .max_lifetime(None)
        .idle_timeout(None)
        .build(manager)
}
