//! Local filesystem client for `file://` URLs
//!
//! Reads guess the media type from the file extension. There is no server
//! side; invoking a file is not supported.

use std::path::PathBuf;

use async_trait::async_trait;
use url::Url;

use crate::content::{Content, DEFAULT_MEDIA_TYPE};
use crate::protocols::{Form, ProtocolClient, ProtocolClientFactory};
use crate::resource::Operation;
use crate::{Error, Result};

/// Client backed by `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct FileClient;

impl FileClient {
    fn path(form: &Form) -> Result<PathBuf> {
        let url = Url::parse(&form.href)?;
        if url.scheme() != "file" {
            return Err(Error::InvalidUrl(format!("{} is not a file URL", form.href)));
        }
        url.to_file_path()
            .map_err(|()| Error::InvalidUrl(format!("{} is not a local file path", form.href)))
    }
}

/// Media type for a file, judged by its extension
#[must_use]
pub fn media_type_for_path(path: &std::path::Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => DEFAULT_MEDIA_TYPE.to_string(),
        Some("jsonld") => "application/ld+json".to_string(),
        _ => mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string(),
    }
}

fn not_found(href: &str, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(href.to_string())
    } else {
        Error::Io(e)
    }
}

#[async_trait]
impl ProtocolClient for FileClient {
    async fn read_resource(&self, form: &Form) -> Result<Content> {
        let path = Self::path(form)?;
        tracing::debug!(path = %path.display(), "reading file resource");
        let body = tokio::fs::read(&path)
            .await
            .map_err(|e| not_found(&form.href, e))?;
        let media_type = form
            .content_type
            .clone()
            .unwrap_or_else(|| media_type_for_path(&path));
        Ok(Content::new(media_type, body))
    }

    async fn write_resource(&self, form: &Form, content: Content) -> Result<()> {
        let path = Self::path(form)?;
        tracing::debug!(path = %path.display(), media_type = %content.media_type, "writing file resource");
        tokio::fs::write(&path, &content.body).await?;
        Ok(())
    }

    async fn invoke_resource(&self, _form: &Form, _input: Option<Content>) -> Result<Content> {
        Err(Error::NotImplemented(Operation::Invoke))
    }

    async fn unlink_resource(&self, form: &Form) -> Result<()> {
        let path = Self::path(form)?;
        tracing::debug!(path = %path.display(), "removing file resource");
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| not_found(&form.href, e))
    }
}

/// Builds clients for `file://` URLs
#[derive(Debug, Clone, Copy, Default)]
pub struct FileClientFactory;

impl ProtocolClientFactory for FileClientFactory {
    fn scheme(&self) -> &str {
        "file"
    }

    fn get_client(&self) -> Result<Box<dyn ProtocolClient>> {
        Ok(Box::new(FileClient))
    }
}
