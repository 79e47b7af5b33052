//! Transport-neutral request handling shared by all protocol servers
//!
//! A server decodes its wire request into an [`Exchange`], hands it to
//! [`handle`] and encodes the returned [`Outcome`] back onto the wire.

use bytes::Bytes;

use crate::content::{Content, ContentSerdes, normalize_media_type};
use crate::resource::{Operation, ResourceMap, dispatch};
use crate::Error;

/// Decoded inbound request
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Operation mapped from the verb; `None` for verbs with no mapping
    pub operation: Option<Operation>,

    /// Resource path
    pub path: String,

    /// Request body, if any
    pub payload: Option<Content>,

    /// Raw accept list (`a, b;q=0.5`)
    pub accept: Option<String>,
}

/// Result category, mapped by each server to its wire status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    UnsupportedMediaType,
    InternalError,
}

/// Response to write back
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: Status,

    /// Response body; error outcomes carry a plain-text diagnostic
    pub content: Option<Content>,
}

impl Outcome {
    const fn ok(content: Option<Content>) -> Self {
        Self {
            status: Status::Ok,
            content,
        }
    }

    fn error(status: Status, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self {
            status,
            content: Some(Content::new("text/plain", Bytes::from(message))),
        }
    }
}

impl From<&Error> for Status {
    fn from(e: &Error) -> Self {
        match e {
            Error::NotImplemented(_) => Self::MethodNotAllowed,
            Error::NotFound(_) => Self::NotFound,
            Error::UnsupportedMediaType(_) => Self::UnsupportedMediaType,
            Error::Codec { .. } | Error::Serialization(_) => Self::BadRequest,
            _ => Self::InternalError,
        }
    }
}

/// Handle one exchange against a path table
///
/// Never fails: every error becomes an [`Outcome`] so one bad exchange cannot
/// affect the server loop.
pub async fn handle(resources: &ResourceMap, serdes: &ContentSerdes, exchange: Exchange) -> Outcome {
    let Exchange {
        operation,
        path,
        payload,
        accept,
    } = exchange;

    let Some(listener) = resources.get(&path) else {
        return Outcome::error(Status::NotFound, format!("no resource at {path}"));
    };

    let Some(operation) = operation else {
        return Outcome::error(Status::MethodNotAllowed, "method not allowed");
    };

    let payload = match operation {
        Operation::Write | Operation::Invoke => payload,
        Operation::Read | Operation::Unlink => None,
    };

    if let Some(content) = &payload
        && let Err(e) = serdes.deserialize(content)
    {
        tracing::debug!(path = %path, error = %e, "rejecting undecodable request body");
        return Outcome::error(Status::from(&e), e.to_string());
    }

    tracing::debug!(path = %path, %operation, "dispatching");
    match dispatch(listener.as_ref(), operation, payload).await {
        Ok(None) => Outcome::ok(None),
        Ok(Some(content)) => {
            let target = negotiate(serdes, accept.as_deref(), &content.media_type);
            match serdes.transcode(content, &target) {
                Ok(content) => Outcome::ok(Some(content)),
                Err(e) => {
                    tracing::debug!(path = %path, accept = %target, error = %e, "cannot encode response");
                    Outcome::error(Status::UnsupportedMediaType, e.to_string())
                }
            }
        }
        Err(e) => {
            let status = Status::from(&e);
            if status == Status::InternalError {
                tracing::warn!(path = %path, %operation, error = %e, "listener failed");
            } else {
                tracing::debug!(path = %path, %operation, error = %e, "listener rejected request");
            }
            Outcome::error(status, e.to_string())
        }
    }
}

/// Pick the response media type from an accept list
///
/// Entries are tried by descending quality, ties in listed order. A wildcard
/// matching the listener's type, the listener's own type, or any type with a
/// registered codec wins. Without a usable entry the listener's type is kept.
#[must_use]
pub fn negotiate(serdes: &ContentSerdes, accept: Option<&str>, produced: &str) -> String {
    let Some(accept) = accept else {
        return produced.to_string();
    };
    let produced_norm = normalize_media_type(produced);

    let mut ranges: Vec<(String, f32)> = accept
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let range = parts.next()?.trim().to_ascii_lowercase();
            if range.is_empty() {
                return None;
            }
            let quality = parts
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            Some((range, quality))
        })
        .filter(|(_, q)| *q > 0.0)
        .collect();
    ranges.sort_by(|a, b| b.1.total_cmp(&a.1));

    for (range, _) in ranges {
        if range == "*/*" || range == produced_norm {
            return produced.to_string();
        }
        if let Some(prefix) = range.strip_suffix("/*") {
            if produced_norm.split('/').next() == Some(prefix) {
                return produced.to_string();
            }
            continue;
        }
        if serdes.is_supported(&range) {
            return range;
        }
    }
    produced.to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::resource::{AssetResourceListener, PropertyResourceListener};

    fn exchange(operation: Option<Operation>, path: &str) -> Exchange {
        Exchange {
            operation,
            path: path.to_string(),
            payload: None,
            accept: None,
        }
    }

    #[test]
    fn negotiate_prefers_quality_then_order() {
        let serdes = ContentSerdes::new();
        assert_eq!(negotiate(&serdes, None, "application/json"), "application/json");
        assert_eq!(
            negotiate(&serdes, Some("text/plain;q=0.5, application/cbor"), "application/json"),
            "application/cbor"
        );
        assert_eq!(
            negotiate(&serdes, Some("application/x-nope, */*"), "text/plain"),
            "text/plain"
        );
        assert_eq!(
            negotiate(&serdes, Some("application/*"), "application/json"),
            "application/json"
        );
        // nothing usable: keep what the listener produced
        assert_eq!(
            negotiate(&serdes, Some("image/png"), "application/json"),
            "application/json"
        );
        assert_eq!(
            negotiate(&serdes, Some("text/plain;q=0"), "application/json"),
            "application/json"
        );
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let outcome = handle(&ResourceMap::new(), &ContentSerdes::new(), exchange(Some(Operation::Read), "/x")).await;
        assert_eq!(outcome.status, Status::NotFound);
    }

    #[tokio::test]
    async fn unmapped_verb_is_method_not_allowed() {
        let resources = ResourceMap::new();
        resources.insert("/", Arc::new(AssetResourceListener::new("TEST")));
        let outcome = handle(&resources, &ContentSerdes::new(), exchange(None, "/")).await;
        assert_eq!(outcome.status, Status::MethodNotAllowed);
    }

    #[tokio::test]
    async fn read_returns_listener_content_untouched() {
        let resources = ResourceMap::new();
        resources.insert("/", Arc::new(AssetResourceListener::new("TEST")));
        let outcome = handle(&resources, &ContentSerdes::new(), exchange(Some(Operation::Read), "/")).await;
        assert_eq!(outcome.status, Status::Ok);
        let content = outcome.content.unwrap();
        assert_eq!(&content.body[..], b"TEST");
        assert_eq!(content.media_type, "application/json");
    }

    #[tokio::test]
    async fn accept_transcodes_response() {
        let serdes = Arc::new(ContentSerdes::new());
        let resources = ResourceMap::new();
        resources.insert("/p", Arc::new(PropertyResourceListener::new(serdes.clone(), json!("hot"))));

        let mut ex = exchange(Some(Operation::Read), "/p");
        ex.accept = Some("text/plain".to_string());
        let outcome = handle(&resources, &serdes, ex).await;
        let content = outcome.content.unwrap();
        assert_eq!(content.media_type, "text/plain");
        assert_eq!(&content.body[..], b"hot");
    }

    #[tokio::test]
    async fn untranscodable_response_is_unsupported() {
        let serdes = ContentSerdes::new();
        let resources = ResourceMap::new();
        resources.insert(
            "/raw",
            Arc::new(AssetResourceListener::with_content(Content::new("application/x-vendor", "?"))),
        );
        let mut ex = exchange(Some(Operation::Read), "/raw");
        ex.accept = Some("application/json".to_string());
        let outcome = handle(&resources, &serdes, ex).await;
        assert_eq!(outcome.status, Status::UnsupportedMediaType);
    }

    #[tokio::test]
    async fn write_with_unknown_type_never_reaches_listener() {
        let serdes = ContentSerdes::new();
        let asset = Arc::new(AssetResourceListener::new("keep"));
        let resources = ResourceMap::new();
        resources.insert("/a", asset.clone());

        let mut ex = exchange(Some(Operation::Write), "/a");
        ex.payload = Some(Content::new("application/x-nope", "new"));
        let outcome = handle(&resources, &serdes, ex).await;
        assert_eq!(outcome.status, Status::UnsupportedMediaType);
        assert_eq!(&asset.content().body[..], b"keep");

        let mut ex = exchange(Some(Operation::Write), "/a");
        ex.payload = Some(Content::new("application/json", "{broken"));
        let outcome = handle(&resources, &serdes, ex).await;
        assert_eq!(outcome.status, Status::BadRequest);
        assert_eq!(&asset.content().body[..], b"keep");
    }

    #[tokio::test]
    async fn unsupported_operation_maps_to_method_not_allowed() {
        let resources = ResourceMap::new();
        resources.insert("/", Arc::new(AssetResourceListener::new("TEST")));
        let outcome = handle(&resources, &ContentSerdes::new(), exchange(Some(Operation::Unlink), "/")).await;
        assert_eq!(outcome.status, Status::MethodNotAllowed);
    }
}
