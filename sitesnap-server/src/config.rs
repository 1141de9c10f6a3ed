use std::path::Path;

use serde::Deserialize;

/// Server configuration, read from TOML.
///
/// The config file path comes from `SITESNAP_SERVER_CONFIG` or defaults to
/// `sitesnap-server.toml` in the working directory; a missing file means
/// defaults throughout.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
    /// Public URL prefix under which the storage directory is served.
    #[serde(default = "default_public_base")]
    pub public_base_url: String,
    /// Optional category catalog file; the built-in catalog is used
    /// otherwise.
    #[serde(default)]
    pub categories_file: Option<String>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_db_path() -> String {
    "./data/sitesnap.db".to_string()
}

fn default_storage_dir() -> String {
    "./data/photos".to_string()
}

fn default_public_base() -> String {
    "/photos".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            storage_dir: default_storage_dir(),
            public_base_url: default_public_base(),
            categories_file: None,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    /// Load from the environment-selected config file, falling back to
    /// defaults when no file exists.
    pub fn load() -> Self {
        let path = std::env::var("SITESNAP_SERVER_CONFIG")
            .unwrap_or_else(|_| "sitesnap-server.toml".to_string());

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
}
