//! Default servient assembly and the `/servient` management resources

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use crate::config::Config;
use crate::content::{Content, ContentSerdes};
use crate::protocols::ProtocolServer;
use crate::protocols::coap::{CoapClientFactory, CoapServer};
use crate::protocols::file::FileClientFactory;
use crate::protocols::http::{HttpClientConfig, HttpClientFactory, HttpServer, HttpsClientFactory};
use crate::resource::{ActionResourceListener, Capability, ResourceListener};
use crate::servient::{ServerList, Servient, resource_paths};
use crate::{Error, Result};

/// Lists the resources exposed by this servient
pub const THINGS_PATH: &str = "/servient/things";

/// Writes its input to the log
pub const LOG_PATH: &str = "/servient/log";

/// Asks the hosting process to shut down
pub const SHUTDOWN_PATH: &str = "/servient/shutdown";

/// Signal from a remote shutdown request to whoever runs the servient
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown; a waiter that arrives later still sees it
    pub fn trigger(&self) {
        self.notify.notify_one();
    }

    /// Wait until shutdown is requested
    pub async fn triggered(&self) {
        self.notify.notified().await;
    }
}

/// Build a servient with the servers enabled in `config` and every client factory
#[must_use]
pub fn default_servient(config: &Config) -> Servient {
    let serdes = Arc::new(ContentSerdes::new());
    let servient = Servient::with_serdes(Arc::clone(&serdes));

    if config.http.enabled {
        servient.add_server(Arc::new(
            HttpServer::new(config.http.port)
                .with_address(config.http.bind_address)
                .with_serdes(Arc::clone(&serdes)),
        ));
    }
    if config.coap.enabled {
        servient.add_server(Arc::new(
            CoapServer::new(config.coap.port)
                .with_address(config.coap.bind_address)
                .with_serdes(Arc::clone(&serdes)),
        ));
    }

    let http = HttpClientConfig {
        timeout: config.client.timeout,
        allow_self_signed: config.http.allow_self_signed,
    };
    servient.add_client_factory(Arc::new(FileClientFactory));
    servient.add_client_factory(Arc::new(HttpClientFactory::new(http.clone())));
    servient.add_client_factory(Arc::new(HttpsClientFactory::new(http)));
    servient.add_client_factory(Arc::new(CoapClientFactory::new(config.client.timeout)));

    for (prefix, credentials) in &config.credentials {
        servient.add_credentials(prefix.clone(), credentials.clone());
    }

    servient
}

/// Register the management resources on every server of `servient`
pub fn expose_management(servient: &Servient, shutdown: ShutdownHandle) {
    let serdes = Arc::clone(servient.serdes());

    servient.add_resource(
        THINGS_PATH,
        Arc::new(ThingsListener {
            servers: servient.server_list(),
            serdes: Arc::clone(&serdes),
        }),
    );

    servient.add_resource(
        LOG_PATH,
        Arc::new(ActionResourceListener::new(Arc::clone(&serdes), |input| async move {
            let message = match input {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => String::new(),
            };
            tracing::info!(%message, "remote log");
            Ok(Value::String(format!("logged '{message}'")))
        })),
    );

    servient.add_resource(
        SHUTDOWN_PATH,
        Arc::new(ActionResourceListener::new(serdes, move |_| {
            let shutdown = shutdown.clone();
            async move {
                tracing::info!("shutdown requested remotely");
                shutdown.trigger();
                Ok(Value::String("shutting down".to_string()))
            }
        })),
    );
}

/// Reads as the JSON array of paths exposed on any server
struct ThingsListener {
    servers: Weak<ServerList>,
    serdes: Arc<ContentSerdes>,
}

#[async_trait]
impl ResourceListener for ThingsListener {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Readable]
    }

    async fn on_read(&self) -> Result<Content> {
        let servers = self
            .servers
            .upgrade()
            .ok_or_else(|| Error::NotFound(THINGS_PATH.to_string()))?;
        let snapshot: Vec<Arc<dyn ProtocolServer>> = servers.read().clone();
        let paths = resource_paths(&snapshot);
        self.serdes.serialize(&Value::from(paths), None)
    }
}
