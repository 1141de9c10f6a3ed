pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::error::AppError;

/// Path of the agent database inside the data directory.
pub fn database_path(data_dir: &str) -> PathBuf {
    Path::new(data_dir).join("sitesnap.db")
}

/// Open the agent database and initialize all schemas on it.
///
/// The upload queue shares this connection; its schema is attached by the
/// queue itself when it is created with `UploadQueue::with_connection`.
pub fn init_database(data_dir: &str) -> Result<Arc<Mutex<Connection>>, AppError> {
    std::fs::create_dir_all(data_dir)?;
    let conn = Connection::open(database_path(data_dir))?;
    schema::init_app_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}
