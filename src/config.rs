use std::path::Path;

use serde::Deserialize;

/// Bootstrap configuration for the agent, read from TOML.
///
/// Runtime state (device id, enabled flag) lives in the local database;
/// this file only seeds the connection settings on first start. Path from
/// `SITESNAP_CONFIG`, default `sitesnap.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
    #[serde(default = "default_probe_path")]
    pub probe_path: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Directory watched for captured photos, named
    /// `<jobId>__<categoryId>__<anything>.jpg`.
    #[serde(default = "default_spool_dir")]
    pub spool_dir: String,
    #[serde(default = "default_thumb_max_edge")]
    pub thumb_max_edge: u32,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8787".to_string()
}

fn default_upload_path() -> String {
    "/api/photos/upload".to_string()
}

fn default_probe_path() -> String {
    "/health".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_spool_dir() -> String {
    "./spool".to_string()
}

fn default_thumb_max_edge() -> u32 {
    512
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            upload_path: default_upload_path(),
            probe_path: default_probe_path(),
            data_dir: default_data_dir(),
            spool_dir: default_spool_dir(),
            thumb_max_edge: default_thumb_max_edge(),
        }
    }
}

impl AgentConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn load() -> Self {
        let path =
            std::env::var("SITESNAP_CONFIG").unwrap_or_else(|_| "sitesnap.toml".to_string());

        if !Path::new(&path).exists() {
            log::info!("No config file at {}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    log::error!("Invalid config {}: {}, using defaults", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                log::error!("Cannot read config {}: {}, using defaults", path, e);
                Self::default()
            }
        }
    }

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
