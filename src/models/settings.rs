use serde::{Deserialize, Serialize};

/// Persisted agent settings. Seeded from the config file on first start,
/// then owned by the local database (the device id in particular must
/// never change between runs).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSettings {
    pub id: i64,
    pub server_url: String,
    pub upload_path: String,
    pub probe_path: String,
    pub enabled: bool,
    pub device_id: Option<String>,
    pub thumb_max_edge: u32,
    pub last_drain: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl AgentSettings {
    /// Full URL of the upload endpoint.
    pub fn upload_url(&self) -> String {
        format!(
            "{}{}",
            self.server_url.trim_end_matches('/'),
            self.upload_path
        )
    }

    /// Full URL of the connectivity probe target.
    pub fn probe_url(&self) -> String {
        format!(
            "{}{}",
            self.server_url.trim_end_matches('/'),
            self.probe_path
        )
    }
}
