//! HTTP protocol server

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::operation_for;
use crate::content::{Content, ContentSerdes};
use crate::protocols::dispatch::{self, Exchange, Status};
use crate::protocols::{Lifecycle, ProtocolServer, ServerState, bind_error};
use crate::resource::ResourceMap;
use crate::{Error, Result};

/// State handed to every request handler
struct HttpShared {
    resources: ResourceMap,
    serdes: Arc<ContentSerdes>,
}

/// Background serve task and the signal that stops it
struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

/// Exposes resources over HTTP
pub struct HttpServer {
    address: IpAddr,
    requested_port: u16,
    resources: ResourceMap,
    serdes: Arc<ContentSerdes>,
    lifecycle: Lifecycle,
    running: Mutex<Option<Running>>,
}

impl HttpServer {
    /// Create a server for all interfaces; port 0 picks a free port on start
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            requested_port: port,
            resources: ResourceMap::new(),
            serdes: Arc::new(ContentSerdes::new()),
            lifecycle: Lifecycle::new(),
            running: Mutex::new(None),
        }
    }

    /// Bind a specific interface
    #[must_use]
    pub const fn with_address(mut self, address: IpAddr) -> Self {
        self.address = address;
        self
    }

    /// Use a shared codec registry
    #[must_use]
    pub fn with_serdes(mut self, serdes: Arc<ContentSerdes>) -> Self {
        self.serdes = serdes;
        self
    }

    /// Build the router serving every path from the resource table
    fn router(&self) -> Router {
        let shared = Arc::new(HttpShared {
            resources: self.resources.clone(),
            serdes: self.serdes.clone(),
        });

        // Open cross-origin access on every response
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .fallback(handle_request)
            .with_state(shared)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }
}

#[async_trait]
impl ProtocolServer for HttpServer {
    fn scheme(&self) -> &'static str {
        "http"
    }

    async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        self.lifecycle.starting();
        let addr = SocketAddr::new(self.address, self.requested_port);
        let bound = match TcpListener::bind(addr).await {
            Ok(listener) => listener.local_addr().map(|local| (listener, local)),
            Err(e) => Err(e),
        };
        let (listener, local) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                self.lifecycle.stopped();
                tracing::warn!(%addr, error = %e, "HTTP server failed to bind");
                return Err(bind_error(addr, e));
            }
        };

        let (shutdown, signal) = oneshot::channel::<()>();
        let app = self.router();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = signal.await;
                })
                .await
        });

        *running = Some(Running { shutdown, task });
        self.lifecycle.started(local.port());
        tracing::info!(port = local.port(), "HTTP server listening");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(Running { shutdown, task }) = self.running.lock().await.take() else {
            return Ok(());
        };

        tracing::info!(port = self.lifecycle.port(), "stopping HTTP server");
        self.lifecycle.stopping();
        let _ = shutdown.send(());
        let result = task.await;
        self.lifecycle.stopped();

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(e) => Err(Error::Io(std::io::Error::other(e))),
        }
    }

    fn port(&self) -> i32 {
        self.lifecycle.port()
    }

    fn state(&self) -> ServerState {
        self.lifecycle.state()
    }

    fn resources(&self) -> &ResourceMap {
        &self.resources
    }
}

/// Translate one HTTP request into an exchange and back
async fn handle_request(
    State(shared): State<Arc<HttpShared>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header_str = |name: header::HeaderName| headers.get(name).and_then(|v| v.to_str().ok());

    let payload = if body.is_empty() {
        None
    } else {
        let media_type = header_str(header::CONTENT_TYPE)
            .unwrap_or_else(|| shared.serdes.default_media_type());
        Some(Content::new(media_type, body))
    };

    let exchange = Exchange {
        operation: operation_for(&method),
        path: uri.path().to_string(),
        payload,
        accept: header_str(header::ACCEPT).map(ToString::to_string),
    };

    let outcome = dispatch::handle(&shared.resources, &shared.serdes, exchange).await;
    let status = status_code(outcome.status);
    match outcome.content {
        Some(content) => (
            status,
            [(header::CONTENT_TYPE, content.media_type)],
            content.body,
        )
            .into_response(),
        None => status.into_response(),
    }
}

const fn status_code(status: Status) -> StatusCode {
    match status {
        Status::Ok => StatusCode::OK,
        Status::BadRequest => StatusCode::BAD_REQUEST,
        Status::NotFound => StatusCode::NOT_FOUND,
        Status::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        Status::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        Status::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
