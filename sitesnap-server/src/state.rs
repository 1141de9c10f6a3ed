use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::categories::CategoryCatalog;
use crate::error::ApiError;
use crate::storage::PhotoStorage;

/// Shared handler state. Handlers are stateless beyond this; the SQLite
/// store carries all coordination.
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    pub storage: PhotoStorage,
    pub categories: Arc<CategoryCatalog>,
}

impl AppState {
    pub fn new(conn: Connection, storage: PhotoStorage, categories: CategoryCatalog) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            storage,
            categories: Arc::new(categories),
        }
    }

    /// Short-lived DB access. Guards must not be held across awaits.
    pub fn db(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::Internal("database connection poisoned".to_string()))
    }
}
