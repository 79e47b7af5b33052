//! The servient: owns protocol servers and client factories
//!
//! Resources registered here are exposed on every server at once; outbound
//! requests are routed to the client factory for the URL's scheme.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Serialize;
use url::Url;

use crate::content::{Content, ContentSerdes};
use crate::protocols::{
    Credentials, Form, ProtocolClient, ProtocolClientFactory, ProtocolServer, ServerState,
};
use crate::resource::{SharedListener, normalize_path};
use crate::{Error, Result};

pub(crate) type ServerList = RwLock<Vec<Arc<dyn ProtocolServer>>>;

/// Snapshot of one server for description layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerDescription {
    pub scheme: String,
    pub port: i32,
    pub state: ServerState,
    pub paths: Vec<String>,
}

/// Composition root for servers, clients and codecs
pub struct Servient {
    servers: Arc<ServerList>,
    client_factories: RwLock<HashMap<String, Arc<dyn ProtocolClientFactory>>>,
    credentials: RwLock<HashMap<String, Credentials>>,
    serdes: Arc<ContentSerdes>,
}

impl Servient {
    /// Create an empty servient with the built-in codecs
    #[must_use]
    pub fn new() -> Self {
        Self::with_serdes(Arc::new(ContentSerdes::new()))
    }

    /// Create an empty servient sharing a codec registry
    #[must_use]
    pub fn with_serdes(serdes: Arc<ContentSerdes>) -> Self {
        Self {
            servers: Arc::new(RwLock::new(Vec::new())),
            client_factories: RwLock::new(HashMap::new()),
            credentials: RwLock::new(HashMap::new()),
            serdes,
        }
    }

    /// Codec registry shared with servers and listeners
    #[must_use]
    pub fn serdes(&self) -> &Arc<ContentSerdes> {
        &self.serdes
    }

    /// Append a server to the active set
    ///
    /// Adding the same instance twice is not guarded against.
    pub fn add_server(&self, server: Arc<dyn ProtocolServer>) {
        tracing::debug!(scheme = server.scheme(), "adding protocol server");
        self.servers.write().push(server);
    }

    /// Active servers, in registration order
    #[must_use]
    pub fn servers(&self) -> Vec<Arc<dyn ProtocolServer>> {
        self.servers.read().clone()
    }

    /// Register a client factory under its scheme; the last one registered wins
    pub fn add_client_factory(&self, factory: Arc<dyn ProtocolClientFactory>) {
        let scheme = factory.scheme().to_ascii_lowercase();
        if self
            .client_factories
            .write()
            .insert(scheme.clone(), factory)
            .is_some()
        {
            tracing::debug!(%scheme, "replaced client factory");
        } else {
            tracing::debug!(%scheme, "added client factory");
        }
    }

    /// Attach credentials to every client built for URLs under `href_prefix`
    pub fn add_credentials(&self, href_prefix: impl Into<String>, credentials: Credentials) {
        self.credentials.write().insert(href_prefix.into(), credentials);
    }

    /// Start every server concurrently
    ///
    /// Servers that started are left running if another one fails.
    ///
    /// # Errors
    ///
    /// Returns the first failure in registration order
    pub async fn start(&self) -> Result<()> {
        let servers = self.servers();
        let results = futures::future::join_all(servers.iter().map(|s| s.start())).await;

        let mut first_error = None;
        for (server, result) in servers.iter().zip(results) {
            match result {
                Ok(()) => {
                    tracing::info!(scheme = server.scheme(), port = server.port(), "server started");
                }
                Err(e) => {
                    tracing::error!(scheme = server.scheme(), error = %e, "server failed to start");
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Stop every server, attempting all of them even when some fail
    ///
    /// # Errors
    ///
    /// Returns `Shutdown` carrying every individual failure
    pub async fn shutdown(&self) -> Result<()> {
        let servers = self.servers();
        let results = futures::future::join_all(servers.iter().map(|s| s.stop())).await;

        let errors: Vec<Error> = servers
            .iter()
            .zip(results)
            .filter_map(|(server, result)| {
                result
                    .inspect_err(|e| {
                        tracing::warn!(scheme = server.scheme(), error = %e, "server failed to stop");
                    })
                    .err()
            })
            .collect();

        if errors.is_empty() {
            tracing::info!("servient shut down");
            Ok(())
        } else {
            Err(Error::Shutdown(errors))
        }
    }

    /// Expose a listener at `path` on every active server
    pub fn add_resource(&self, path: &str, listener: SharedListener) {
        let path = normalize_path(path);
        for server in self.servers.read().iter() {
            server.add_resource(&path, Arc::clone(&listener));
        }
        tracing::info!(%path, "resource exposed");
    }

    /// Withdraw `path` from every active server; `true` if any server had it
    pub fn remove_resource(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.servers
            .read()
            .iter()
            .fold(false, |removed, server| server.remove_resource(&path) || removed)
    }

    /// Paths exposed on any server, sorted and deduplicated
    #[must_use]
    pub fn resource_paths(&self) -> Vec<String> {
        resource_paths(&self.servers.read())
    }

    /// Which servers are active and what they expose
    #[must_use]
    pub fn server_descriptions(&self) -> Vec<ServerDescription> {
        self.servers
            .read()
            .iter()
            .map(|server| ServerDescription {
                scheme: server.scheme().to_string(),
                port: server.port(),
                state: server.state(),
                paths: server.resource_paths(),
            })
            .collect()
    }

    /// Build a client for a scheme
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedScheme` if no factory is registered for it
    pub fn client_for(&self, scheme: &str) -> Result<Box<dyn ProtocolClient>> {
        let factory = self
            .client_factories
            .read()
            .get(&scheme.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| Error::UnsupportedScheme(scheme.to_string()))?;
        factory.get_client()
    }

    /// Build a client for a URL, with the longest matching credentials applied
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` or `UnsupportedScheme`
    pub fn client_for_url(&self, href: &str) -> Result<Box<dyn ProtocolClient>> {
        let scheme = Form::new(href).scheme()?;
        let mut client = self.client_for(&scheme)?;

        let target = Url::parse(href)?;
        let credentials = self
            .credentials
            .read()
            .iter()
            .filter(|(prefix, _)| Url::parse(prefix).is_ok_and(|prefix| covers(&prefix, &target)))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, credentials)| credentials.clone());
        if let Some(credentials) = credentials
            && !client.set_security(credentials)
        {
            tracing::warn!(%scheme, "client ignored configured credentials");
        }

        Ok(client)
    }

    #[must_use]
    pub fn has_client_for(&self, scheme: &str) -> bool {
        self.client_factories
            .read()
            .contains_key(&scheme.to_ascii_lowercase())
    }

    /// Registered client schemes, sorted
    #[must_use]
    pub fn client_schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.client_factories.read().keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// Read a remote resource through the client for its scheme
    ///
    /// # Errors
    ///
    /// Returns client construction or transport errors
    pub async fn read_resource(&self, form: &Form) -> Result<Content> {
        self.client_for_url(&form.href)?.read_resource(form).await
    }

    /// Write a remote resource through the client for its scheme
    ///
    /// # Errors
    ///
    /// Returns client construction or transport errors
    pub async fn write_resource(&self, form: &Form, content: Content) -> Result<()> {
        self.client_for_url(&form.href)?
            .write_resource(form, content)
            .await
    }

    /// Invoke a remote resource through the client for its scheme
    ///
    /// # Errors
    ///
    /// Returns client construction or transport errors
    pub async fn invoke_resource(&self, form: &Form, input: Option<Content>) -> Result<Content> {
        self.client_for_url(&form.href)?
            .invoke_resource(form, input)
            .await
    }

    /// Unlink a remote resource through the client for its scheme
    ///
    /// # Errors
    ///
    /// Returns client construction or transport errors
    pub async fn unlink_resource(&self, form: &Form) -> Result<()> {
        self.client_for_url(&form.href)?.unlink_resource(form).await
    }

    /// Non-owning view of the server list for listeners that reflect on it
    pub(crate) fn server_list(&self) -> Weak<ServerList> {
        Arc::downgrade(&self.servers)
    }
}

impl Default for Servient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Servient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Servient")
            .field("servers", &self.servers.read().len())
            .field("client_schemes", &self.client_schemes())
            .finish_non_exhaustive()
    }
}

pub(crate) fn resource_paths(servers: &[Arc<dyn ProtocolServer>]) -> Vec<String> {
    servers
        .iter()
        .flat_map(|server| server.resource_paths())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Whether credentials registered for `prefix` belong to `target`
///
/// Scheme, host and port must match exactly. A prefix path that does not end
/// in `/` still only matches whole segments.
fn covers(prefix: &Url, target: &Url) -> bool {
    if prefix.scheme() != target.scheme()
        || prefix.host_str() != target.host_str()
        || prefix.port_or_known_default() != target.port_or_known_default()
    {
        return false;
    }

    let base = prefix.path();
    let path = target.path();
    if base.is_empty() || base.ends_with('/') {
        return path.starts_with(base);
    }
    path == base || path.strip_prefix(base).is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::file::FileClientFactory;
    use crate::protocols::http::{HttpClientFactory, HttpServer};
    use crate::resource::AssetResourceListener;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn credential_prefixes_match_whole_hosts_and_segments() {
        let origin = url("https://example.com");
        assert!(covers(&origin, &url("https://example.com/a/b")));
        assert!(covers(&origin, &url("https://example.com:443/a")));
        assert!(!covers(&origin, &url("https://example.com.evil.net/steal")));
        assert!(!covers(&origin, &url("https://example.com@evil.net/")));
        assert!(!covers(&origin, &url("http://example.com/a")));
        assert!(!covers(&origin, &url("https://example.com:8443/a")));

        let api = url("https://example.com/api");
        assert!(covers(&api, &url("https://example.com/api")));
        assert!(covers(&api, &url("https://example.com/api/things")));
        assert!(!covers(&api, &url("https://example.com/apiary")));
    }

    #[test]
    fn resources_fan_out_to_every_server() {
        let servient = Servient::new();
        servient.add_server(Arc::new(HttpServer::new(0)));
        servient.add_server(Arc::new(HttpServer::new(0)));

        servient.add_resource("things/lamp", Arc::new(AssetResourceListener::new("on")));
        for server in servient.servers() {
            assert_eq!(server.resource_paths(), vec!["/things/lamp".to_string()]);
        }
        assert_eq!(servient.resource_paths(), vec!["/things/lamp".to_string()]);

        assert!(servient.remove_resource("/things/lamp"));
        assert!(!servient.remove_resource("/things/lamp"));
        assert!(servient.resource_paths().is_empty());
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let servient = Servient::new();
        servient.add_client_factory(Arc::new(FileClientFactory));
        assert!(servient.has_client_for("FILE"));
        assert!(servient.client_for("file").is_ok());
        assert!(matches!(
            servient.client_for("mqtt"),
            Err(Error::UnsupportedScheme(s)) if s == "mqtt"
        ));
        assert!(matches!(
            servient.client_for_url("mqtt://broker/topic"),
            Err(Error::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn schemes_are_listed_sorted() {
        let servient = Servient::new();
        servient.add_client_factory(Arc::new(HttpClientFactory::default()));
        servient.add_client_factory(Arc::new(FileClientFactory));
        assert_eq!(servient.client_schemes(), vec!["file".to_string(), "http".to_string()]);
    }

    #[test]
    fn descriptions_reflect_stopped_servers() {
        let servient = Servient::new();
        servient.add_server(Arc::new(HttpServer::new(0)));
        servient.add_resource("/a", Arc::new(AssetResourceListener::new("a")));

        let descriptions = servient.server_descriptions();
        assert_eq!(descriptions.len(), 1);
        assert_eq!(descriptions[0].scheme, "http");
        assert_eq!(descriptions[0].port, -1);
        assert_eq!(descriptions[0].state, ServerState::Stopped);
        assert_eq!(descriptions[0].paths, vec!["/a".to_string()]);
    }
}
