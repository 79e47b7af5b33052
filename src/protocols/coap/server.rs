//! CoAP protocol server

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use coap_lite::{CoapOption, MessageClass, MessageType, Packet, ResponseType};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, oneshot};
use tokio::task::{JoinHandle, JoinSet};

use super::dedup::{ExchangeCache, Seen};
use super::{format, operation_for};
use crate::content::{Content, ContentSerdes};
use crate::protocols::dispatch::{self, Exchange, Outcome, Status};
use crate::protocols::{Lifecycle, ProtocolServer, ServerState, bind_error};
use crate::resource::{Operation, ResourceMap};
use crate::{Error, Result};

/// Largest datagram accepted
const MAX_DATAGRAM: usize = 64 * 1024;

struct CoapShared {
    socket: UdpSocket,
    resources: ResourceMap,
    serdes: Arc<ContentSerdes>,
    exchanges: ExchangeCache,
}

struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Exposes resources over CoAP
pub struct CoapServer {
    address: IpAddr,
    requested_port: u16,
    resources: ResourceMap,
    serdes: Arc<ContentSerdes>,
    lifecycle: Lifecycle,
    running: Mutex<Option<Running>>,
}

impl CoapServer {
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
}

#[async_trait]
impl ProtocolServer for CoapServer {
    fn scheme(&self) -> &'static str {
        "coap"
    }

    async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        self.lifecycle.starting();
        let addr = SocketAddr::new(self.address, self.requested_port);
        let bound = match UdpSocket::bind(addr).await {
            Ok(socket) => socket.local_addr().map(|local| (socket, local)),
            Err(e) => Err(e),
        };
        let (socket, local) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                self.lifecycle.stopped();
                tracing::warn!(%addr, error = %e, "CoAP server failed to bind");
                return Err(bind_error(addr, e));
            }
        };

        let shared = Arc::new(CoapShared {
            socket,
            resources: self.resources.clone(),
            serdes: self.serdes.clone(),
            exchanges: ExchangeCache::default(),
        });
        let (shutdown, signal) = oneshot::channel();
        let task = tokio::spawn(serve(shared, signal));

        *running = Some(Running { shutdown, task });
        self.lifecycle.started(local.port());
        tracing::info!(port = local.port(), "CoAP server listening");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(Running { shutdown, task }) = self.running.lock().await.take() else {
            return Ok(());
        };

        tracing::info!(port = self.lifecycle.port(), "stopping CoAP server");
        self.lifecycle.stopping();
        let _ = shutdown.send(());
        let result = task.await;
        self.lifecycle.stopped();
        result.map_err(|e| Error::Io(std::io::Error::other(e)))
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

/// Receive loop: one task per datagram, drained on shutdown
async fn serve(shared: Arc<CoapShared>, mut signal: oneshot::Receiver<()>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut signal => break,
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            received = shared.socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => {
                    let datagram = buf[..len].to_vec();
                    in_flight.spawn(handle_datagram(shared.clone(), datagram, peer));
                }
                Err(e) => tracing::debug!(error = %e, "CoAP receive failed"),
            },
        }
    }

    // in-flight exchanges still answer on the shared socket
    while in_flight.join_next().await.is_some() {}
}

async fn handle_datagram(shared: Arc<CoapShared>, datagram: Vec<u8>, peer: SocketAddr) {
    let request = match Packet::from_bytes(&datagram) {
        Ok(packet) => packet,
        Err(e) => {
            tracing::debug!(%peer, error = ?e, "dropping malformed CoAP datagram");
            return;
        }
    };

    let message_type = request.header.get_type();
    if matches!(message_type, MessageType::Acknowledgement | MessageType::Reset) {
        return;
    }
    let MessageClass::Request(method) = &request.header.code else {
        return;
    };

    let message_id = request.header.message_id;
    match shared.exchanges.begin(peer, message_id) {
        Seen::New => {}
        Seen::InFlight => {
            tracing::debug!(%peer, message_id, "dropping duplicate of request in progress");
            return;
        }
        Seen::Answered(bytes) => {
            tracing::debug!(%peer, message_id, "replaying response to duplicate request");
            if let Err(e) = shared.socket.send_to(&bytes, peer).await {
                tracing::debug!(%peer, error = %e, "CoAP send failed");
            }
            return;
        }
    }

    let operation = operation_for(method);
    let outcome = match decode_exchange(&request, operation, shared.serdes.default_media_type()) {
        Ok(exchange) => dispatch::handle(&shared.resources, &shared.serdes, exchange).await,
        Err(outcome) => outcome,
    };

    let response = build_response(&request, operation, outcome);
    match response.to_bytes() {
        Ok(bytes) => {
            shared.exchanges.finish(peer, message_id, bytes.clone());
            if let Err(e) = shared.socket.send_to(&bytes, peer).await {
                tracing::debug!(%peer, error = %e, "CoAP send failed");
            }
        }
        Err(e) => {
            shared.exchanges.abandon(peer, message_id);
            tracing::warn!(%peer, error = ?e, "failed to encode CoAP response");
        }
    }
}

/// Pull path, payload and accept out of a request packet
fn decode_exchange(
    request: &Packet,
    operation: Option<Operation>,
    default_media_type: &str,
) -> std::result::Result<Exchange, Outcome> {
    let path = request
        .get_option(CoapOption::UriPath)
        .map(|segments| {
            segments
                .iter()
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default();

    let payload = if request.payload.is_empty() {
        None
    } else {
        let media_type = match first_uint(request, CoapOption::ContentFormat) {
            None => default_media_type.to_string(),
            Some(code) => match format::media_type_for(code) {
                Some(media_type) => media_type.to_string(),
                None => {
                    return Err(Outcome {
                        status: Status::UnsupportedMediaType,
                        content: None,
                    });
                }
            },
        };
        Some(Content::new(media_type, Bytes::from(request.payload.clone())))
    };

    let accept = first_uint(request, CoapOption::Accept)
        .and_then(format::media_type_for)
        .map(ToString::to_string);

    Ok(Exchange {
        operation,
        path: format!("/{path}"),
        payload,
        accept,
    })
}

fn first_uint(packet: &Packet, option: CoapOption) -> Option<u16> {
    packet
        .get_option(option)
        .and_then(|values| values.front())
        .and_then(|value| format::decode_uint(value))
}

/// Piggybacked ACK for confirmable requests, NON otherwise
fn build_response(request: &Packet, operation: Option<Operation>, outcome: Outcome) -> Packet {
    let mut response = Packet::new();
    if matches!(request.header.get_type(), MessageType::Confirmable) {
        response.header.set_type(MessageType::Acknowledgement);
        response.header.message_id = request.header.message_id;
    } else {
        response.header.set_type(MessageType::NonConfirmable);
        response.header.message_id = rand::random();
    }
    response.set_token(request.get_token().to_vec());

    let has_payload = outcome.content.as_ref().is_some_and(|c| !c.is_empty());
    response.header.code = MessageClass::Response(response_type(outcome.status, operation, has_payload));

    if let Some(content) = outcome.content {
        if let Some(code) = format::format_for(&content.media_type) {
            response.add_option(CoapOption::ContentFormat, format::encode_uint(code));
        }
        response.payload = content.body.to_vec();
    }
    response
}

const fn response_type(status: Status, operation: Option<Operation>, has_payload: bool) -> ResponseType {
    match status {
        Status::Ok => match operation {
            Some(Operation::Write) => ResponseType::Changed,
            Some(Operation::Unlink) => ResponseType::Deleted,
            Some(Operation::Invoke) if !has_payload => ResponseType::Changed,
            _ => ResponseType::Content,
        },
        Status::BadRequest => ResponseType::BadRequest,
        Status::NotFound => ResponseType::NotFound,
        Status::MethodNotAllowed => ResponseType::MethodNotAllowed,
        Status::UnsupportedMediaType => ResponseType::UnsupportedContentFormat,
        Status::InternalError => ResponseType::InternalServerError,
    }
}
