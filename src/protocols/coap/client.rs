//! CoAP protocol client

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use coap_lite::{CoapOption, MessageClass, MessageType, Packet, RequestType, ResponseType};
use tokio::net::UdpSocket;
use url::Url;

use super::{DEFAULT_PORT, format, method_for, method_for_code};
use crate::content::{Content, DEFAULT_MEDIA_TYPE};
use crate::protocols::{Form, ProtocolClient, ProtocolClientFactory, status_error};
use crate::resource::Operation;
use crate::{Error, Result};

/// Initial retransmission timeout (RFC 7252 `ACK_TIMEOUT`)
const ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Retransmissions of a confirmable request (RFC 7252 `MAX_RETRANSMIT`)
const MAX_RETRANSMIT: u32 = 4;

const MAX_DATAGRAM: usize = 64 * 1024;

/// Client for `coap://` resources
#[derive(Debug, Clone)]
pub struct CoapClient {
    timeout: Duration,
}

impl CoapClient {
    /// Create a client whose exchanges give up after `timeout`
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn exchange(&self, form: &Form, operation: Operation, content: Option<Content>) -> Result<Content> {
        let url = Url::parse(&form.href)?;
        let method = match form.method_code {
            Some(code) => method_for_code(code)
                .ok_or_else(|| Error::Coap(format!("unsupported method code {code}")))?,
            None => method_for(operation),
        };
        let (token, request) = build_request(&url, method, form.content_type.as_deref(), content)?;
        let target = resolve(&url).await?;

        tracing::debug!(href = %form.href, %operation, %target, "sending CoAP request");

        let socket = UdpSocket::bind(if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }).await?;
        socket.connect(target).await?;

        let reply = tokio::time::timeout(
            self.timeout,
            confirmable_exchange(&socket, &request, &token),
        )
        .await
        .map_err(|_| Error::Timeout(form.href.clone()))??;

        into_content(&form.href, operation, reply)
    }
}

impl Default for CoapClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl ProtocolClient for CoapClient {
    async fn read_resource(&self, form: &Form) -> Result<Content> {
        self.exchange(form, Operation::Read, None).await
    }

    async fn write_resource(&self, form: &Form, content: Content) -> Result<()> {
        self.exchange(form, Operation::Write, Some(content)).await.map(|_| ())
    }

    async fn invoke_resource(&self, form: &Form, input: Option<Content>) -> Result<Content> {
        self.exchange(form, Operation::Invoke, input).await
    }

    async fn unlink_resource(&self, form: &Form) -> Result<()> {
        self.exchange(form, Operation::Unlink, None).await.map(|_| ())
    }
}

/// Builds clients for `coap://` URLs
#[derive(Debug, Clone, Default)]
pub struct CoapClientFactory {
    timeout: Option<Duration>,
}

impl CoapClientFactory {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

impl ProtocolClientFactory for CoapClientFactory {
    fn scheme(&self) -> &str {
        "coap"
    }

    fn get_client(&self) -> Result<Box<dyn ProtocolClient>> {
        Ok(Box::new(
            self.timeout.map_or_else(CoapClient::default, CoapClient::new),
        ))
    }
}

async fn resolve(url: &Url) -> Result<SocketAddr> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidUrl(format!("{url} has no host")))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = url.port().unwrap_or(DEFAULT_PORT);
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| Error::InvalidUrl(format!("{host} did not resolve")))
}

/// Encode a confirmable request, returning its token and bytes
///
/// A media type without a Content-Format number cannot be labelled on the
/// wire, so it is rejected rather than sent unlabelled.
fn build_request(
    url: &Url,
    method: RequestType,
    accept: Option<&str>,
    content: Option<Content>,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut packet = Packet::new();
    packet.header.set_type(MessageType::Confirmable);
    packet.header.code = MessageClass::Request(method);
    packet.header.message_id = rand::random();
    let token: [u8; 4] = rand::random();
    packet.set_token(token.to_vec());

    if let Some(segments) = url.path_segments() {
        for segment in segments.filter(|s| !s.is_empty()) {
            packet.add_option(CoapOption::UriPath, segment.as_bytes().to_vec());
        }
    }
    if let Some(query) = url.query() {
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            packet.add_option(CoapOption::UriQuery, pair.as_bytes().to_vec());
        }
    }
    if let Some(media_type) = accept {
        let code = format::format_for(media_type)
            .ok_or_else(|| Error::UnsupportedMediaType(media_type.to_string()))?;
        packet.add_option(CoapOption::Accept, format::encode_uint(code));
    }
    if let Some(content) = content.filter(|content| !content.body.is_empty()) {
        let code = format::format_for(&content.media_type)
            .ok_or_else(|| Error::UnsupportedMediaType(content.media_type.clone()))?;
        packet.add_option(CoapOption::ContentFormat, format::encode_uint(code));
        packet.payload = content.body.to_vec();
    }

    Ok((token.to_vec(), packet.to_bytes()?))
}

/// Send with exponential retransmission until a matching response arrives
///
/// An empty ACK stops retransmission; the separate response that follows is
/// acknowledged if it is itself confirmable.
async fn confirmable_exchange(socket: &UdpSocket, request: &[u8], token: &[u8]) -> Result<Packet> {
    let request_id = Packet::from_bytes(request)?.header.message_id;
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut wait = ACK_TIMEOUT;
    let mut retransmissions = 0;
    let mut acknowledged = false;

    socket.send(request).await?;
    loop {
        let received = if acknowledged {
            Ok(socket.recv(&mut buf).await)
        } else {
            tokio::time::timeout(wait, socket.recv(&mut buf)).await
        };

        let len = match received {
            Ok(result) => result?,
            Err(_) => {
                if retransmissions >= MAX_RETRANSMIT {
                    return Err(Error::Timeout(format!(
                        "no acknowledgement after {retransmissions} retransmissions"
                    )));
                }
                retransmissions += 1;
                wait *= 2;
                tracing::debug!(retransmissions, "retransmitting CoAP request");
                socket.send(request).await?;
                continue;
            }
        };

        let Ok(reply) = Packet::from_bytes(&buf[..len]) else {
            continue;
        };

        match (&reply.header.code, reply.header.get_type()) {
            (MessageClass::Empty, MessageType::Acknowledgement) if reply.header.message_id == request_id => {
                acknowledged = true;
            }
            (MessageClass::Empty, MessageType::Reset) if reply.header.message_id == request_id => {
                return Err(Error::Coap("request reset by peer".to_string()));
            }
            (MessageClass::Response(_), message_type) if reply.get_token() == token => {
                if matches!(message_type, MessageType::Confirmable) {
                    let mut ack = Packet::new();
                    ack.header.set_type(MessageType::Acknowledgement);
                    ack.header.code = MessageClass::Empty;
                    ack.header.message_id = reply.header.message_id;
                    socket.send(&ack.to_bytes()?).await?;
                }
                return Ok(reply);
            }
            _ => {}
        }
    }
}

/// Turn a response packet into content or an error
fn into_content(href: &str, operation: Operation, reply: Packet) -> Result<Content> {
    let MessageClass::Response(response_type) = &reply.header.code else {
        return Err(Error::Coap("reply is not a response".to_string()));
    };
    let status = response_code(response_type);

    if !(200..300).contains(&status) {
        return Err(status_error(status, href, operation, &reply.payload));
    }

    let media_type = reply
        .get_option(CoapOption::ContentFormat)
        .and_then(|values| values.front())
        .and_then(|value| format::decode_uint(value))
        .and_then(format::media_type_for)
        .unwrap_or(DEFAULT_MEDIA_TYPE);
    Ok(Content::new(media_type, Bytes::from(reply.payload)))
}

/// Response class and detail as an HTTP-style number (4.04 → 404)
const fn response_code(response_type: &ResponseType) -> u16 {
    match response_type {
        ResponseType::Created => 201,
        ResponseType::Deleted => 202,
        ResponseType::Valid => 203,
        ResponseType::Changed => 204,
        ResponseType::Content => 205,
        ResponseType::BadRequest => 400,
        ResponseType::Unauthorized => 401,
        ResponseType::BadOption => 402,
        ResponseType::Forbidden => 403,
        ResponseType::NotFound => 404,
        ResponseType::MethodNotAllowed => 405,
        ResponseType::NotAcceptable => 406,
        ResponseType::PreconditionFailed => 412,
        ResponseType::RequestEntityTooLarge => 413,
        ResponseType::UnsupportedContentFormat => 415,
        ResponseType::NotImplemented => 501,
        ResponseType::BadGateway => 502,
        ResponseType::ServiceUnavailable => 503,
        ResponseType::GatewayTimeout => 504,
        ResponseType::ProxyingNotSupported => 505,
        _ => 500,
    }
}
