pub mod agent;
pub mod capture_service;
pub mod settings_service;

pub use agent::{DrainTrigger, SyncAgent};
pub use capture_service::{capture_photo, ingest_spool, CaptureOutcome, CaptureRequest};
