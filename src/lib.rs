//! Servient - protocol binding runtime for exposing and consuming resources
//!
//! This library provides the transport layer of a servient:
//! - Content codecs keyed by media type
//! - Resource listeners with read/write/invoke/unlink capabilities
//! - HTTP and CoAP protocol servers, plus HTTP(S), CoAP and file clients
//! - A servient that fans resources out to every server and routes outbound
//!   requests by URL scheme
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Resource Listeners                  │
//! │      Asset  │  Property  │  Action  │  custom ...   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                     Servient                        │
//! │   Servers  │  Client Factories  │  Content Serdes   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                Protocol Bindings                    │
//! │   HTTP server/client  │  CoAP server/client  │ file │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod management;
pub mod protocols;
pub mod resource;
pub mod servient;

pub use config::Config;
pub use content::{Content, ContentCodec, ContentSerdes};
pub use error::{Error, Result};
pub use management::{ShutdownHandle, default_servient, expose_management};
pub use protocols::{
    Credentials, Form, ProtocolClient, ProtocolClientFactory, ProtocolServer, ServerState,
};
pub use resource::{Capability, Operation, ResourceListener, SharedListener};
pub use servient::{ServerDescription, Servient};
