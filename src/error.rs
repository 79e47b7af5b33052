//! Error types for the servient

use thiserror::Error;

use crate::resource::Operation;

/// Result type alias for servient operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while exposing or consuming resources
#[derive(Debug, Error)]
pub enum Error {
    /// The listener does not support the requested operation
    #[error("operation not implemented: {0}")]
    NotImplemented(Operation),

    /// No listener is registered at the path
    #[error("not found: {0}")]
    NotFound(String),

    /// No codec is registered for the media type
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// A codec rejected the payload
    #[error("codec error ({media_type}): {message}")]
    Codec {
        media_type: String,
        message: String,
    },

    /// The requested port is already bound by another listener
    #[error("address in use: {0}")]
    AddressInUse(String),

    /// No client factory is registered for the URL scheme
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// Malformed resource URL
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Remote endpoint answered with a status that has no local error kind
    #[error("remote status {status}: {message}")]
    RemoteStatus { status: u16, message: String },

    /// CoAP framing or exchange error
    #[error("coap error: {0}")]
    Coap(String),

    /// Request did not complete in time
    #[error("timeout: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// One or more servers failed to stop
    #[error("shutdown failed for {} server(s)", .0.len())]
    Shutdown(Vec<Error>),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Build a codec error for a media type
    pub fn codec(media_type: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Codec {
            media_type: media_type.into(),
            message: message.to_string(),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::InvalidUrl(e.to_string())
    }
}

impl From<coap_lite::error::MessageError> for Error {
    fn from(e: coap_lite::error::MessageError) -> Self {
        Self::Coap(format!("{e:?}"))
    }
}
