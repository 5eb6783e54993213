use std::path::PathBuf;

use serde::Deserialize;

use super::descriptor::ItemId;

fn default_true() -> bool {
    true
}

fn default_category() -> String {
    "blinds_shades".to_string()
}

fn default_entity_type() -> ItemId {
    ItemId::Number(7)
}

fn default_timeout_secs() -> u64 {
    10
}

/// Configuration for the Control4 integration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Director hostname or IP address
    pub host: String,

    /// Director port, if not the scheme default
    #[serde(default)]
    pub port: Option<u16>,

    /// Talk to the director over HTTPS (default: true)
    #[serde(default = "default_true")]
    pub tls: bool,

    /// Accept the director's self-signed certificate (default: true)
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,

    /// Director bearer token
    pub bearer_token: Option<String>,

    /// File holding the director bearer token, re-read before every request
    pub token_file: Option<PathBuf>,

    /// Item category to query (default: "blinds_shades")
    #[serde(default = "default_category")]
    pub category: String,

    /// Item `type` tag of controllable devices (default: 7)
    #[serde(default = "default_entity_type")]
    pub entity_type: ItemId,

    /// Unique name of the controller, devices are linked to it when set
    pub controller_name: Option<String>,

    /// Per-request timeout in seconds (default: 10)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Config {
    /// Base URL of the director, e.g. `https://192.168.1.25`
    pub fn base_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        match self.port {
            Some(port) => format!("{}://{}:{}", scheme, self.host, port),
            None => format!("{}://{}", scheme, self.host),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("integrations.control4.host must not be empty".to_string());
        }
        match (&self.bearer_token, &self.token_file) {
            (Some(_), Some(_)) => Err(
                "integrations.control4: set only one of bearer_token and token_file".to_string(),
            ),
            (None, None) => Err(
                "integrations.control4: one of bearer_token or token_file is required".to_string(),
            ),
            _ => Ok(()),
        }
    }
}
