//! Shared test utilities

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use servient::content::Content;
use servient::protocols::http::HttpServer;
use servient::{Capability, Operation, ResourceListener, Result};

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Answers every operation with "TEST", counting calls and remembering the last one
#[derive(Default)]
pub struct TestResourceListener {
    last: Mutex<Option<Operation>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl TestResourceListener {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sleep this long inside every operation
    #[must_use]
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            delay: Some(delay),
        })
    }

    pub fn last_operation(&self) -> Option<Operation> {
        *self.last.lock()
    }

    /// Operations handled so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn record(&self, operation: Operation) {
        *self.last.lock() = Some(operation);
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ResourceListener for TestResourceListener {
    fn capabilities(&self) -> &'static [Capability] {
        &[
            Capability::Readable,
            Capability::Writable,
            Capability::Invocable,
            Capability::Unlinkable,
        ]
    }

    async fn on_read(&self) -> Result<Content> {
        self.record(Operation::Read).await;
        Ok(Content::new("text/plain", "TEST"))
    }

    async fn on_write(&self, _content: Content) -> Result<()> {
        self.record(Operation::Write).await;
        Ok(())
    }

    async fn on_invoke(&self, _input: Content) -> Result<Content> {
        self.record(Operation::Invoke).await;
        Ok(Content::new("text/plain", "TEST"))
    }

    async fn on_unlink(&self) -> Result<()> {
        self.record(Operation::Unlink).await;
        Ok(())
    }
}

/// HTTP server on a free loopback port
#[must_use]
pub fn http_server() -> Arc<HttpServer> {
    Arc::new(HttpServer::new(0).with_address(LOCALHOST))
}

/// Base URL of a started server
#[must_use]
pub fn base_url(scheme: &str, port: i32) -> String {
    format!("{scheme}://127.0.0.1:{port}")
}
