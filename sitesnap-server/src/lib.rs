//! # Sitesnap Server
//!
//! Server side of the job-site photo pipeline:
//! - Append-only entry store: every delivered photo variant is history
//! - Snapshot reconciliation: one canonical photo per (job, category)
//!   slot, auto-selected until a technician pins a choice
//! - Upload, metadata and per-job read endpoints
//! - Filesystem object storage with public URLs
//!
//! Handlers are stateless; the SQLite store and the reconciliation rules
//! carry all cross-device coordination. Duplicate deliveries from client
//! retries are accepted as ordinary history (at-least-once ingest).

pub mod categories;
pub mod config;
pub mod entries;
pub mod error;
pub mod router;
pub mod routes;
pub mod schema;
pub mod snapshot;
pub mod state;
pub mod storage;

pub use categories::{CategoryCatalog, CategoryKind, CategoryTemplate};
pub use config::ServerConfig;
pub use entries::{append_entry, get_entry, list_entries, NewEntry, PhotoEntry};
pub use error::{ApiError, ApiResult};
pub use router::build_router;
pub use schema::init_server_schema;
pub use snapshot::{
    category_complete, ensure_selection, get_snapshot, merge_metadata, pin_selection, select_best,
    upsert_from_entry, PhotoSnapshot,
};
pub use state::AppState;
pub use storage::{PhotoStorage, StoredObject};
