//! Configuration management for the servient
//!
//! Precedence is env > TOML file > defaults.

pub mod file;

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use crate::protocols::Credentials;
use crate::protocols::coap::DEFAULT_PORT as DEFAULT_COAP_PORT;
use crate::{Error, Result};

pub use file::{ServientConfigFile, config_file_path, load_config_file};

/// Servient configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// HTTP server binding
    pub http: HttpConfig,

    /// CoAP server binding
    pub coap: CoapConfig,

    /// Outbound client settings
    pub client: ClientConfig,

    /// Credentials keyed by href prefix
    pub credentials: HashMap<String, Credentials>,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Run an HTTP server
    pub enabled: bool,

    /// Interface to bind
    pub bind_address: IpAddr,

    /// Port to listen on (0 picks a free one)
    pub port: u16,

    /// Accept self-signed certificates when consuming `https://` resources
    /// (from `SERVIENT_ALLOW_SELF_SIGNED`)
    pub allow_self_signed: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: IpAddr::from([0, 0, 0, 0]),
            port: 8080,
            allow_self_signed: false,
        }
    }
}

/// CoAP server configuration
#[derive(Debug, Clone)]
pub struct CoapConfig {
    pub enabled: bool,
    pub bind_address: IpAddr,
    pub port: u16,
}

impl Default for CoapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_COAP_PORT,
        }
    }
}

/// Outbound client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load configuration from the standard config file and environment
    ///
    /// # Errors
    ///
    /// Returns error if a bind address does not parse
    pub fn load() -> Result<Self> {
        let mut config = Self::from_file(load_config_file())?;
        config.apply_env();
        Ok(config)
    }

    /// Parse an explicit TOML document, then apply environment overrides
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or a bind address does not parse
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let fc: ServientConfigFile = toml::from_str(content)?;
        let mut config = Self::from_file(fc)?;
        config.apply_env();
        Ok(config)
    }

    /// Overlay a parsed config file on the defaults
    ///
    /// # Errors
    ///
    /// Returns error if a bind address does not parse
    pub fn from_file(fc: ServientConfigFile) -> Result<Self> {
        let defaults = Self::default();

        let http = HttpConfig {
            enabled: fc.http.enabled.unwrap_or(defaults.http.enabled),
            bind_address: parse_address(fc.http.bind_address.as_deref())?
                .unwrap_or(defaults.http.bind_address),
            port: fc.http.port.unwrap_or(defaults.http.port),
            allow_self_signed: fc
                .http
                .allow_self_signed
                .unwrap_or(defaults.http.allow_self_signed),
        };

        let coap = CoapConfig {
            enabled: fc.coap.enabled.unwrap_or(defaults.coap.enabled),
            bind_address: parse_address(fc.coap.bind_address.as_deref())?
                .unwrap_or(defaults.coap.bind_address),
            port: fc.coap.port.unwrap_or(defaults.coap.port),
        };

        let client = ClientConfig {
            timeout: fc
                .client
                .timeout_secs
                .map_or(defaults.client.timeout, Duration::from_secs),
        };

        Ok(Self {
            http,
            coap,
            client,
            credentials: fc.credentials,
        })
    }

    fn apply_env(&mut self) {
        if let Some(port) = env_parse("SERVIENT_HTTP_PORT") {
            self.http.port = port;
        }
        if let Some(port) = env_parse("SERVIENT_COAP_PORT") {
            self.coap.port = port;
        }
        if let Ok(v) = std::env::var("SERVIENT_ALLOW_SELF_SIGNED") {
            self.http.allow_self_signed = v == "true" || v == "1";
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn parse_address(address: Option<&str>) -> Result<Option<IpAddr>> {
    address
        .map(|a| {
            a.parse()
                .map_err(|e| Error::Config(format!("invalid bind address {a}: {e}")))
        })
        .transpose()
}
