//! Resource listeners and transport-independent dispatch
//!
//! A listener implements any subset of read/write/invoke/unlink and reports
//! that subset through [`ResourceListener::capabilities`]. Dispatch checks the
//! capability before calling into the listener, so an unsupported operation
//! never reaches listener code.

mod listeners;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

pub use listeners::{ActionHandler, ActionResourceListener, AssetResourceListener, PropertyResourceListener};

use crate::content::Content;
use crate::{Error, Result};

/// Operation a listener may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Answers reads
    Readable,
    /// Accepts writes
    Writable,
    /// Can be invoked as an action
    Invocable,
    /// Can be unlinked (deleted)
    Unlinkable,
}

/// A single operation requested against a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Write,
    Invoke,
    Unlink,
}

impl Operation {
    /// Capability a listener needs to serve this operation
    #[must_use]
    pub const fn capability(self) -> Capability {
        match self {
            Self::Read => Capability::Readable,
            Self::Write => Capability::Writable,
            Self::Invoke => Capability::Invocable,
            Self::Unlink => Capability::Unlinkable,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Invoke => write!(f, "invoke"),
            Self::Unlink => write!(f, "unlink"),
        }
    }
}

/// Handler for the operations of one resource
///
/// Every operation defaults to `NotImplemented`; implement the ones you
/// declare in [`capabilities`](Self::capabilities).
#[async_trait]
pub trait ResourceListener: Send + Sync {
    /// Declare which operations this listener supports
    fn capabilities(&self) -> &'static [Capability] {
        &[]
    }

    /// Read the current representation
    async fn on_read(&self) -> Result<Content> {
        Err(Error::NotImplemented(Operation::Read))
    }

    /// Replace the current representation
    async fn on_write(&self, _content: Content) -> Result<()> {
        Err(Error::NotImplemented(Operation::Write))
    }

    /// Run the action with the given input
    async fn on_invoke(&self, _input: Content) -> Result<Content> {
        Err(Error::NotImplemented(Operation::Invoke))
    }

    /// Remove the resource
    async fn on_unlink(&self) -> Result<()> {
        Err(Error::NotImplemented(Operation::Unlink))
    }

    /// Check if the listener supports an operation
    fn supports(&self, operation: Operation) -> bool {
        self.capabilities().contains(&operation.capability())
    }
}

/// Listener shared between several servers' path tables
pub type SharedListener = Arc<dyn ResourceListener>;

/// Run one operation against a listener
///
/// Returns the output payload for reads and invokes, `None` for writes and
/// unlinks. A missing input is passed as empty default-typed content.
///
/// # Errors
///
/// Returns `NotImplemented` without calling the listener if the capability is
/// missing, otherwise whatever the listener returns
pub async fn dispatch(
    listener: &dyn ResourceListener,
    operation: Operation,
    input: Option<Content>,
) -> Result<Option<Content>> {
    if !listener.supports(operation) {
        return Err(Error::NotImplemented(operation));
    }
    match operation {
        Operation::Read => listener.on_read().await.map(Some),
        Operation::Write => listener
            .on_write(input.unwrap_or_else(Content::empty))
            .await
            .map(|()| None),
        Operation::Invoke => listener
            .on_invoke(input.unwrap_or_else(Content::empty))
            .await
            .map(Some),
        Operation::Unlink => listener.on_unlink().await.map(|()| None),
    }
}

/// Path to listener table owned by one protocol server
///
/// Cloning shares the table. Lookups clone the listener handle out under the
/// read lock so dispatch never holds the lock across an await.
#[derive(Clone, Default)]
pub struct ResourceMap {
    inner: Arc<RwLock<HashMap<String, SharedListener>>>,
}

impl ResourceMap {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener, returning the one it replaced
    pub fn insert(&self, path: &str, listener: SharedListener) -> Option<SharedListener> {
        self.inner.write().insert(normalize_path(path), listener)
    }

    /// Remove the listener at a path
    pub fn remove(&self, path: &str) -> bool {
        self.inner.write().remove(&normalize_path(path)).is_some()
    }

    /// Exact-match lookup
    #[must_use]
    pub fn get(&self, path: &str) -> Option<SharedListener> {
        self.inner.read().get(&normalize_path(path)).cloned()
    }

    /// Registered paths, sorted
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.inner.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl fmt::Debug for ResourceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMap")
            .field("paths", &self.paths())
            .finish()
    }
}

/// Ensure a resource path starts with `/`
#[must_use]
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Write-only listener counting the calls it receives
    #[derive(Default)]
    struct WriteOnly {
        writes: AtomicUsize,
        other: AtomicUsize,
    }

    #[async_trait]
    impl ResourceListener for WriteOnly {
        fn capabilities(&self) -> &'static [Capability] {
            &[Capability::Writable]
        }

        async fn on_read(&self) -> Result<Content> {
            self.other.fetch_add(1, Ordering::SeqCst);
            Ok(Content::empty())
        }

        async fn on_write(&self, _content: Content) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn read_on_write_only_listener_is_not_implemented() {
        let listener = WriteOnly::default();
        let err = dispatch(&listener, Operation::Read, None).await.unwrap_err();
        assert!(matches!(err, Error::NotImplemented(Operation::Read)));
        // capability check happens before the listener is touched
        assert_eq!(listener.other.load(Ordering::SeqCst), 0);
        assert_eq!(listener.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn write_reaches_listener_once() {
        let listener = WriteOnly::default();
        let out = dispatch(&listener, Operation::Write, Some(Content::new("text/plain", "x")))
            .await
            .unwrap();
        assert!(out.is_none());
        assert_eq!(listener.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn default_methods_are_not_implemented() {
        struct Nothing;
        impl ResourceListener for Nothing {}

        let listener = Nothing;
        for op in [Operation::Read, Operation::Write, Operation::Invoke, Operation::Unlink] {
            assert!(!listener.supports(op));
            let err = dispatch(&listener, op, None).await.unwrap_err();
            assert!(matches!(err, Error::NotImplemented(o) if o == op));
        }
    }

    #[test]
    fn resource_map_is_shared_and_exact() {
        let map = ResourceMap::new();
        let shared = map.clone();
        shared.insert("things", Arc::new(WriteOnly::default()));

        assert!(map.get("/things").is_some());
        assert!(map.get("/things/").is_none());
        assert!(map.get("/thing").is_none());
        assert_eq!(map.paths(), vec!["/things".to_string()]);

        assert!(map.remove("/things"));
        assert!(!map.remove("/things"));
        assert!(shared.is_empty());
    }
}
