//! CoAP binding over UDP
//!
//! Method codes map to operations exactly like HTTP verbs, and numeric
//! Content-Format options stand in for media type strings.

mod client;
mod dedup;
pub mod format;
mod server;

pub use client::{CoapClient, CoapClientFactory};
pub use server::CoapServer;

use coap_lite::RequestType;

use crate::resource::Operation;

/// Default CoAP port
pub const DEFAULT_PORT: u16 = 5683;

/// Operation served for an inbound method
#[must_use]
pub const fn operation_for(method: &RequestType) -> Option<Operation> {
    match method {
        RequestType::Get => Some(Operation::Read),
        RequestType::Put => Some(Operation::Write),
        RequestType::Post => Some(Operation::Invoke),
        RequestType::Delete => Some(Operation::Unlink),
        _ => None,
    }
}

/// Default method a client sends for an operation
#[must_use]
pub const fn method_for(operation: Operation) -> RequestType {
    match operation {
        Operation::Read => RequestType::Get,
        Operation::Write => RequestType::Put,
        Operation::Invoke => RequestType::Post,
        Operation::Unlink => RequestType::Delete,
    }
}

/// Method for a `coap:methodCode` override (0.01 through 0.04)
#[must_use]
pub const fn method_for_code(code: u8) -> Option<RequestType> {
    match code {
        1 => Some(RequestType::Get),
        2 => Some(RequestType::Post),
        3 => Some(RequestType::Put),
        4 => Some(RequestType::Delete),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_codes() {
        assert!(matches!(method_for_code(2), Some(RequestType::Post)));
        assert!(method_for_code(9).is_none());
        for op in [Operation::Read, Operation::Write, Operation::Invoke, Operation::Unlink] {
            assert_eq!(operation_for(&method_for(op)), Some(op));
        }
    }
}
