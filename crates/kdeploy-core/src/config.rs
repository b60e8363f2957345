//! kdeploy.toml configuration parser.
//!
//! Holds the control-plane connection settings. Everything else the
//! upgrade needs comes from the command line.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdeployConfig {
    pub connection: ConnectionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Base URL of the control-plane API, e.g. `https://10.0.0.1:6443/`.
    pub api_endpoint: String,
    /// PEM client certificate.
    pub cert: PathBuf,
    /// PEM private key for `cert`.
    pub key: PathBuf,
    /// PEM CA bundle used to verify the API server.
    pub ca_cert: PathBuf,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl KdeployConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: KdeployConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl ConnectionConfig {
    /// API endpoint with a guaranteed trailing slash.
    pub fn endpoint(&self) -> String {
        if self.api_endpoint.ends_with('/') {
            self.api_endpoint.clone()
        } else {
            format!("{}/", self.api_endpoint)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
