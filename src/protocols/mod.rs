//! Protocol bindings
//!
//! Each transport provides a [`ProtocolServer`] that exposes resources and a
//! [`ProtocolClientFactory`] that builds clients for its URL scheme.

pub mod coap;
pub mod dispatch;
pub mod file;
pub mod http;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::content::Content;
use crate::resource::{Operation, ResourceMap, SharedListener};
use crate::{Error, Result};

/// Lifecycle state of a protocol server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Stopped,
    Starting,
    Started,
    Stopping,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Started => write!(f, "started"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// A transport listener exposing resources
#[async_trait]
pub trait ProtocolServer: Send + Sync {
    /// URL scheme served (e.g. "http")
    fn scheme(&self) -> &'static str;

    /// Bind and start accepting requests; a no-op when already started
    async fn start(&self) -> Result<()>;

    /// Stop accepting requests, letting in-flight ones finish; a no-op when stopped
    async fn stop(&self) -> Result<()>;

    /// Bound port while started, `-1` otherwise
    fn port(&self) -> i32;

    /// Current lifecycle state
    fn state(&self) -> ServerState;

    /// Path table consulted for every inbound request
    fn resources(&self) -> &ResourceMap;

    /// Expose a listener at a path, replacing any listener already there
    fn add_resource(&self, path: &str, listener: SharedListener) {
        if self.resources().insert(path, listener).is_some() {
            tracing::debug!(scheme = self.scheme(), path, "replaced resource listener");
        } else {
            tracing::debug!(scheme = self.scheme(), path, "added resource listener");
        }
    }

    /// Stop exposing the listener at a path
    fn remove_resource(&self, path: &str) -> bool {
        self.resources().remove(path)
    }

    /// Exposed paths, sorted
    fn resource_paths(&self) -> Vec<String> {
        self.resources().paths()
    }
}

/// Describes where and how to reach a remote resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    /// Resource URL
    pub href: String,

    /// Media type to request (and to send, when the caller has no content)
    #[serde(rename = "contentType", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// HTTP verb replacing the operation's default verb
    #[serde(rename = "http:methodName", default, skip_serializing_if = "Option::is_none")]
    pub method_name: Option<String>,

    /// CoAP method code replacing the operation's default method
    #[serde(rename = "coap:methodCode", default, skip_serializing_if = "Option::is_none")]
    pub method_code: Option<u8>,
}

impl Form {
    #[must_use]
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            ..Self::default()
        }
    }

    /// Request a specific media type
    #[must_use]
    pub fn with_content_type(mut self, media_type: impl Into<String>) -> Self {
        self.content_type = Some(media_type.into());
        self
    }

    /// Override the HTTP verb
    #[must_use]
    pub fn with_method_name(mut self, method: impl Into<String>) -> Self {
        self.method_name = Some(method.into());
        self
    }

    /// Override the CoAP method code
    #[must_use]
    pub const fn with_method_code(mut self, code: u8) -> Self {
        self.method_code = Some(code);
        self
    }

    /// Lowercased URL scheme of `href`
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` if `href` does not parse
    pub fn scheme(&self) -> Result<String> {
        let url = url::Url::parse(&self.href)?;
        Ok(url.scheme().to_ascii_lowercase())
    }
}

/// Credentials a client attaches to its requests
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Bearer { .. } => f.debug_struct("Bearer").field("token", &"<redacted>").finish(),
        }
    }
}

/// Performs operations against remote resources for one scheme
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Fetch the resource's representation
    async fn read_resource(&self, form: &Form) -> Result<Content>;

    /// Replace the resource's representation
    async fn write_resource(&self, form: &Form, content: Content) -> Result<()>;

    /// Invoke the resource as an action
    async fn invoke_resource(&self, form: &Form, input: Option<Content>) -> Result<Content>;

    /// Remove the resource
    async fn unlink_resource(&self, form: &Form) -> Result<()>;

    /// Attach credentials to subsequent requests
    ///
    /// Returns `false` if the transport has no use for credentials.
    fn set_security(&mut self, _credentials: Credentials) -> bool {
        false
    }
}

/// Builds clients for one URL scheme
pub trait ProtocolClientFactory: Send + Sync {
    /// Scheme this factory serves (e.g. "coap")
    fn scheme(&self) -> &str;

    /// Build a fresh client
    ///
    /// # Errors
    ///
    /// Returns error if the transport cannot be configured
    fn get_client(&self) -> Result<Box<dyn ProtocolClient>>;
}

/// State and bound port shared by the server implementations
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: parking_lot::RwLock<ServerState>,
    port: AtomicI32,
}

impl Lifecycle {
    pub(crate) const fn new() -> Self {
        Self {
            state: parking_lot::const_rwlock(ServerState::Stopped),
            port: AtomicI32::new(-1),
        }
    }

    pub(crate) fn state(&self) -> ServerState {
        *self.state.read()
    }

    pub(crate) fn port(&self) -> i32 {
        self.port.load(Ordering::SeqCst)
    }

    pub(crate) fn starting(&self) {
        *self.state.write() = ServerState::Starting;
    }

    pub(crate) fn started(&self, port: u16) {
        self.port.store(i32::from(port), Ordering::SeqCst);
        *self.state.write() = ServerState::Started;
    }

    /// Port reads -1 from the moment stopping begins
    pub(crate) fn stopping(&self) {
        self.port.store(-1, Ordering::SeqCst);
        *self.state.write() = ServerState::Stopping;
    }

    pub(crate) fn stopped(&self) {
        self.port.store(-1, Ordering::SeqCst);
        *self.state.write() = ServerState::Stopped;
    }
}

/// Map a bind failure, keeping "port taken" distinct from other IO errors
pub(crate) fn bind_error(addr: SocketAddr, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::AddrInUse {
        Error::AddressInUse(addr.to_string())
    } else {
        Error::Io(e)
    }
}

/// Map a remote status to the local error taxonomy
pub(crate) fn status_error(status: u16, href: &str, operation: Operation, body: &[u8]) -> Error {
    match status {
        404 => Error::NotFound(href.to_string()),
        405 => Error::NotImplemented(operation),
        415 => Error::UnsupportedMediaType(String::from_utf8_lossy(body).into_owned()),
        _ => Error::RemoteStatus {
            status,
            message: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn form_uses_binding_keys() {
        let form: Form = serde_json::from_value(json!({
            "href": "http://localhost:60603/",
            "http:methodName": "POST"
        }))
        .unwrap();
        assert_eq!(form.method_name.as_deref(), Some("POST"));
        assert_eq!(form.scheme().unwrap(), "http");

        let value = serde_json::to_value(Form::new("coap://host/x").with_method_code(2)).unwrap();
        assert_eq!(value, json!({"href": "coap://host/x", "coap:methodCode": 2}));
    }

    #[test]
    fn form_scheme_rejects_garbage() {
        assert!(matches!(Form::new("not a url").scheme(), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn credentials_debug_hides_secrets() {
        let creds = Credentials::Basic {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn lifecycle_port_tracks_state() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.port(), -1);
        lifecycle.starting();
        assert_eq!(lifecycle.state(), ServerState::Starting);
        assert_eq!(lifecycle.port(), -1);
        lifecycle.started(56831);
        assert_eq!(lifecycle.port(), 56831);
        lifecycle.stopping();
        assert_eq!(lifecycle.state(), ServerState::Stopping);
        assert_eq!(lifecycle.port(), -1);
        lifecycle.stopped();
        assert_eq!(lifecycle.port(), -1);
        assert_eq!(lifecycle.state(), ServerState::Stopped);
    }

    #[test]
    fn addr_in_use_is_its_own_kind() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let err = bind_error(addr, std::io::Error::from(std::io::ErrorKind::AddrInUse));
        assert!(matches!(err, Error::AddressInUse(a) if a == "127.0.0.1:8080"));
        let err = bind_error(addr, std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert!(matches!(status_error(404, "h", Operation::Read, b""), Error::NotFound(_)));
        assert!(matches!(
            status_error(405, "h", Operation::Write, b""),
            Error::NotImplemented(Operation::Write)
        ));
        assert!(matches!(
            status_error(415, "h", Operation::Write, b""),
            Error::UnsupportedMediaType(_)
        ));
        assert!(matches!(
            status_error(500, "h", Operation::Read, b"boom"),
            Error::RemoteStatus { status: 500, .. }
        ));
    }
}
