//! TOML configuration file loading
//!
//! Supports `~/.config/servient/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::protocols::Credentials;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ServientConfigFile {
    /// HTTP binding
    #[serde(default)]
    pub http: HttpFileConfig,

    /// CoAP binding
    #[serde(default)]
    pub coap: CoapFileConfig,

    /// Outbound client settings
    #[serde(default)]
    pub client: ClientFileConfig,

    /// Credentials keyed by href prefix
    #[serde(default)]
    pub credentials: HashMap<String, Credentials>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HttpFileConfig {
    pub enabled: Option<bool>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,

    /// Accept self-signed certificates on `https://` clients
    pub allow_self_signed: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CoapFileConfig {
    pub enabled: Option<bool>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientFileConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ServientConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ServientConfigFile {
    let Some(path) = config_file_path() else {
        return ServientConfigFile::default();
    };

    if !path.exists() {
        return ServientConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ServientConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ServientConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/servient/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("servient").join("config.toml"))
}
