//! Media type to codec registry

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::codec::{CborCodec, ContentCodec, JsonCodec, OctetStreamCodec, TextCodec};
use super::{Content, DEFAULT_MEDIA_TYPE, normalize_media_type};
use crate::{Error, Result};

/// Registry of content codecs keyed by normalized media type
///
/// Registration is additive and last-write-wins, so protocol bindings can add
/// or replace encodings without touching the default JSON codec.
pub struct ContentSerdes {
    codecs: RwLock<HashMap<String, Arc<dyn ContentCodec>>>,
    default_media_type: String,
}

impl ContentSerdes {
    /// Create a registry with the built-in JSON, text, octet-stream and CBOR codecs
    #[must_use]
    pub fn new() -> Self {
        let serdes = Self::empty();
        serdes.register(Arc::new(JsonCodec));
        serdes.register(Arc::new(TextCodec));
        serdes.register(Arc::new(OctetStreamCodec));
        serdes.register(Arc::new(CborCodec));
        serdes
    }

    /// Create a registry with no codecs
    #[must_use]
    pub fn empty() -> Self {
        Self {
            codecs: RwLock::new(HashMap::new()),
            default_media_type: DEFAULT_MEDIA_TYPE.to_string(),
        }
    }

    /// Register a codec, returning the codec it replaced (if any)
    pub fn register(&self, codec: Arc<dyn ContentCodec>) -> Option<Arc<dyn ContentCodec>> {
        let key = normalize_media_type(codec.media_type());
        tracing::debug!(media_type = %key, "registering content codec");
        self.codecs.write().insert(key, codec)
    }

    /// Media type used when none is supplied
    #[must_use]
    pub fn default_media_type(&self) -> &str {
        &self.default_media_type
    }

    /// Look up the codec for a media type (parameters and case ignored)
    #[must_use]
    pub fn codec_for(&self, media_type: &str) -> Option<Arc<dyn ContentCodec>> {
        self.codecs
            .read()
            .get(&normalize_media_type(media_type))
            .cloned()
    }

    /// Check if a codec exists for the media type
    #[must_use]
    pub fn is_supported(&self, media_type: &str) -> bool {
        self.codecs
            .read()
            .contains_key(&normalize_media_type(media_type))
    }

    /// List the registered media types, sorted
    #[must_use]
    pub fn supported_media_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.codecs.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Encode a value as content
    ///
    /// `None` or an empty media type selects the default codec.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedMediaType` if no codec is registered, or the codec's error
    pub fn serialize(&self, value: &Value, media_type: Option<&str>) -> Result<Content> {
        let media_type = self.resolve(media_type);
        let codec = self
            .codec_for(&media_type)
            .ok_or_else(|| Error::UnsupportedMediaType(media_type.clone()))?;
        let body = codec.value_to_bytes(value)?;
        Ok(Content::new(media_type, body))
    }

    /// Decode content into a value
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedMediaType` if no codec is registered, or the codec's error
    pub fn deserialize(&self, content: &Content) -> Result<Value> {
        let media_type = self.resolve(Some(&content.media_type));
        let codec = self
            .codec_for(&media_type)
            .ok_or(Error::UnsupportedMediaType(media_type))?;
        codec.bytes_to_value(&content.body)
    }

    /// Re-encode content under another media type
    ///
    /// Content already of the target type is returned untouched, even when
    /// no codec exists for it.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedMediaType` if either side has no codec
    pub fn transcode(&self, content: Content, target: &str) -> Result<Content> {
        if normalize_media_type(&content.media_type) == normalize_media_type(target) {
            return Ok(content);
        }
        let value = self.deserialize(&content)?;
        self.serialize(&value, Some(target))
    }

    fn resolve(&self, media_type: Option<&str>) -> String {
        match media_type.map(str::trim) {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => self.default_media_type.clone(),
        }
    }
}

impl Default for ContentSerdes {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContentSerdes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentSerdes")
            .field("media_types", &self.supported_media_types())
            .field("default_media_type", &self.default_media_type)
            .finish()
    }
}
