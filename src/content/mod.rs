//! Tagged payloads and the codecs that convert them to and from values
//!
//! A [`Content`] is an opaque byte payload plus the media type that gives it
//! meaning. [`ContentSerdes`] maps normalized media types to codecs.

mod codec;
mod serdes;

use bytes::Bytes;

pub use codec::{CborCodec, ContentCodec, JsonCodec, OctetStreamCodec, TextCodec};
pub use serdes::ContentSerdes;

/// Media type used when a request declares none
pub const DEFAULT_MEDIA_TYPE: &str = "application/json";

/// A byte payload tagged with its media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    /// Media type as declared by the producer (parameters included)
    pub media_type: String,

    /// Raw payload
    pub body: Bytes,
}

impl Content {
    /// Create content from a media type and body
    #[must_use]
    pub fn new(media_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            media_type: media_type.into(),
            body: body.into(),
        }
    }

    /// Create an empty payload of the default media type
    #[must_use]
    pub fn empty() -> Self {
        Self::new(DEFAULT_MEDIA_TYPE, Bytes::new())
    }

    /// Check if the payload has no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Media type without parameters, lowercased
    #[must_use]
    pub fn normalized_type(&self) -> String {
        normalize_media_type(&self.media_type)
    }
}

/// Normalize a media type for codec lookups
///
/// Parameters after `;` are dropped, whitespace is trimmed and the result is
/// lowercased, so `Application/JSON; charset=utf-8` becomes `application/json`.
#[must_use]
pub fn normalize_media_type(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_parameters_and_case() {
        assert_eq!(
            normalize_media_type("Application/JSON; charset=utf-8"),
            "application/json"
        );
        assert_eq!(normalize_media_type("  text/plain  "), "text/plain");
        assert_eq!(normalize_media_type(""), "");
    }

    #[test]
    fn empty_content_uses_default_type() {
        let content = Content::empty();
        assert!(content.is_empty());
        assert_eq!(content.media_type, DEFAULT_MEDIA_TYPE);
    }

    #[test]
    fn normalized_type_of_content() {
        let content = Content::new("TEXT/Plain;charset=utf-8", "hi");
        assert_eq!(content.normalized_type(), "text/plain");
    }
}
