//! HTTP and HTTPS protocol clients

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use super::method_for;
use crate::content::{Content, DEFAULT_MEDIA_TYPE};
use crate::protocols::{Credentials, Form, ProtocolClient, ProtocolClientFactory, status_error};
use crate::resource::Operation;
use crate::{Error, Result};

/// Transport settings for HTTP clients
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-request timeout
    pub timeout: Duration,

    /// Accept self-signed / invalid TLS certificates
    pub allow_self_signed: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            allow_self_signed: false,
        }
    }
}

/// Client for `http://` and `https://` resources
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    credentials: Option<Credentials>,
}

impl HttpClient {
    /// Create a new HTTP client
    ///
    /// # Errors
    ///
    /// Returns error if the TLS backend cannot be initialized
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.allow_self_signed)
            .build()?;
        Ok(Self {
            client,
            credentials: None,
        })
    }

    /// Issue the request for an operation, honoring the form's verb override
    async fn send(&self, form: &Form, operation: Operation, content: Option<Content>) -> Result<Content> {
        let method = match &form.method_name {
            Some(name) => Method::from_bytes(name.to_ascii_uppercase().as_bytes())
                .map_err(|e| Error::InvalidUrl(format!("bad method {name}: {e}")))?,
            None => method_for(operation),
        };

        tracing::debug!(href = %form.href, %method, %operation, "sending HTTP request");

        let mut request = self.client.request(method, &form.href);
        if let Some(accept) = &form.content_type {
            request = request.header(ACCEPT, accept);
        }

        if let Some(content) = content {
            request = request
                .header(CONTENT_TYPE, content.media_type)
                .body(content.body);
        }

        request = match &self.credentials {
            Some(Credentials::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(Credentials::Bearer { token }) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_MEDIA_TYPE)
            .to_string();
        let body = response.bytes().await?;

        if !status.is_success() {
            tracing::debug!(href = %form.href, status = status.as_u16(), "HTTP request failed");
            return Err(status_error(status.as_u16(), &form.href, operation, &body));
        }

        Ok(Content::new(media_type, body))
    }
}

#[async_trait]
impl ProtocolClient for HttpClient {
    async fn read_resource(&self, form: &Form) -> Result<Content> {
        self.send(form, Operation::Read, None).await
    }

    async fn write_resource(&self, form: &Form, content: Content) -> Result<()> {
        self.send(form, Operation::Write, Some(content)).await.map(|_| ())
    }

    async fn invoke_resource(&self, form: &Form, input: Option<Content>) -> Result<Content> {
        self.send(form, Operation::Invoke, input).await
    }

    async fn unlink_resource(&self, form: &Form) -> Result<()> {
        self.send(form, Operation::Unlink, None).await.map(|_| ())
    }

    fn set_security(&mut self, credentials: Credentials) -> bool {
        self.credentials = Some(credentials);
        true
    }
}

/// Builds clients for `http://` URLs
#[derive(Debug, Clone, Default)]
pub struct HttpClientFactory {
    config: HttpClientConfig,
}

impl HttpClientFactory {
    #[must_use]
    pub const fn new(config: HttpClientConfig) -> Self {
        Self { config }
    }
}

impl ProtocolClientFactory for HttpClientFactory {
    fn scheme(&self) -> &str {
        "http"
    }

    fn get_client(&self) -> Result<Box<dyn ProtocolClient>> {
        Ok(Box::new(HttpClient::new(&self.config)?))
    }
}

/// Builds clients for `https://` URLs
#[derive(Debug, Clone, Default)]
pub struct HttpsClientFactory {
    config: HttpClientConfig,
}

impl HttpsClientFactory {
    #[must_use]
    pub const fn new(config: HttpClientConfig) -> Self {
        Self { config }
    }
}

impl ProtocolClientFactory for HttpsClientFactory {
    fn scheme(&self) -> &str {
        "https"
    }

    fn get_client(&self) -> Result<Box<dyn ProtocolClient>> {
        Ok(Box::new(HttpClient::new(&self.config)?))
    }
}
