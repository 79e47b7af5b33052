//! Stock listeners for common resource shapes

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;

use super::{Capability, ResourceListener};
use crate::Result;
use crate::content::{Content, ContentSerdes, DEFAULT_MEDIA_TYPE};

/// Serves a fixed payload that writes may replace
#[derive(Debug)]
pub struct AssetResourceListener {
    asset: RwLock<Content>,
}

impl AssetResourceListener {
    /// Create an asset tagged with the default media type
    #[must_use]
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self::with_content(Content::new(DEFAULT_MEDIA_TYPE, body))
    }

    /// Create an asset from existing content
    #[must_use]
    pub fn with_content(content: Content) -> Self {
        Self {
            asset: RwLock::new(content),
        }
    }

    /// Current payload
    #[must_use]
    pub fn content(&self) -> Content {
        self.asset.read().clone()
    }
}

#[async_trait]
impl ResourceListener for AssetResourceListener {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Readable, Capability::Writable]
    }

    async fn on_read(&self) -> Result<Content> {
        Ok(self.content())
    }

    async fn on_write(&self, content: Content) -> Result<()> {
        *self.asset.write() = content;
        Ok(())
    }
}

/// Holds a value and converts it through the codec registry
///
/// Reads encode with the registry's default media type; writes accept any
/// registered media type.
pub struct PropertyResourceListener {
    value: RwLock<Value>,
    serdes: Arc<ContentSerdes>,
}

impl PropertyResourceListener {
    #[must_use]
    pub fn new(serdes: Arc<ContentSerdes>, initial: Value) -> Self {
        Self {
            value: RwLock::new(initial),
            serdes,
        }
    }

    /// Current value
    #[must_use]
    pub fn value(&self) -> Value {
        self.value.read().clone()
    }

    /// Replace the value locally
    pub fn set(&self, value: Value) {
        *self.value.write() = value;
    }
}

#[async_trait]
impl ResourceListener for PropertyResourceListener {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Readable, Capability::Writable]
    }

    async fn on_read(&self) -> Result<Content> {
        let value = self.value();
        self.serdes.serialize(&value, None)
    }

    async fn on_write(&self, content: Content) -> Result<()> {
        let value = self.serdes.deserialize(&content)?;
        self.set(value);
        Ok(())
    }
}

/// Async handler behind an [`ActionResourceListener`]
pub type ActionHandler = Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Runs an async handler on invoke
///
/// Input is decoded with the codec matching its media type (an empty body
/// becomes `None`); output is encoded with the configured output type.
pub struct ActionResourceListener {
    handler: ActionHandler,
    serdes: Arc<ContentSerdes>,
    output_media_type: Option<String>,
}

impl ActionResourceListener {
    pub fn new<F, Fut>(serdes: Arc<ContentSerdes>, handler: F) -> Self
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |input| handler(input).boxed()),
            serdes,
            output_media_type: None,
        }
    }

    /// Encode results with this media type instead of the default
    #[must_use]
    pub fn with_output_type(mut self, media_type: impl Into<String>) -> Self {
        self.output_media_type = Some(media_type.into());
        self
    }
}

#[async_trait]
impl ResourceListener for ActionResourceListener {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Invocable]
    }

    async fn on_invoke(&self, input: Content) -> Result<Content> {
        let value = if input.is_empty() {
            None
        } else {
            Some(self.serdes.deserialize(&input)?)
        };
        let output = (self.handler)(value).await?;
        self.serdes
            .serialize(&output, self.output_media_type.as_deref())
    }
}
